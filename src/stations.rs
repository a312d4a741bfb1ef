//! Station directory: code -> name/city/coordinates lookup, alias groups for
//! stations that share a display name, and the provincial-capital set used
//! by city-level views.

use crate::decoder::RawRow;
use crate::types::{columns, StationOptionRow};
use crate::util::{normalize_text, parse_f64_safe};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coords {
    pub lat: f64,
    pub lon: f64,
}

impl Coords {
    /// Both values must parse, be finite and fall in WGS84 range; anything
    /// else is "no coordinates" (never a silent zero).
    pub fn parse(lat: Option<&str>, lon: Option<&str>) -> Option<Coords> {
        let lat = parse_f64_safe(lat)?;
        let lon = parse_f64_safe(lon)?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return None;
        }
        Some(Coords { lat, lon })
    }
}

/// One entry of the station dimension table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationRef {
    pub code: String,
    pub name: String,
    pub city: String,
    pub coords: Option<Coords>,
}

/// Result of [`StationDirectory::resolve`]; always populated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedStation {
    pub code: String,
    pub name: String,
    pub city: String,
    pub coords: Option<Coords>,
}

/// A logical station for selection lists: every code sharing one
/// normalized display name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationItem {
    pub representative_code: String,
    pub name: String,
    pub codes: BTreeSet<String>,
    pub search_key: String,
}

impl StationItem {
    pub fn matches_query(&self, query: &str) -> bool {
        let q = normalize_text(query);
        q.is_empty() || self.search_key.contains(&q)
    }

    pub fn to_row(&self) -> StationOptionRow {
        let aliases: Vec<&str> = self
            .codes
            .iter()
            .map(String::as_str)
            .filter(|c| *c != self.representative_code)
            .collect();
        StationOptionRow {
            code: self.representative_code.clone(),
            name: self.name.clone(),
            aliases: aliases.join(", "),
        }
    }
}

/// Capital-city group key and its display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CapitalKey {
    pub key: String,
    pub display: String,
}

/// Normalized provincial-capital names. Empty means "no filtering".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapoluogoSet {
    entries: BTreeMap<String, String>,
}

fn is_name_boundary(c: char) -> bool {
    matches!(c, ' ' | '-' | '/' | '\'' | ',' | '(')
}

fn has_prefix_word(haystack: &str, prefix: &str) -> bool {
    haystack.len() > prefix.len()
        && haystack.starts_with(prefix)
        && haystack[prefix.len()..].chars().next().is_some_and(is_name_boundary)
}

impl CapoluogoSet {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries = BTreeMap::new();
        for name in names {
            let display = name.as_ref().trim();
            let key = normalize_text(display);
            if !key.is_empty() {
                entries.entry(key).or_insert_with(|| display.to_string());
            }
        }
        Self { entries }
    }

    /// One city per row, under any of the known column names (or the first
    /// column when none match).
    pub fn from_rows(rows: &[RawRow]) -> Self {
        Self::from_names(rows.iter().filter_map(|r| {
            r.pick(columns::CAPITAL).or_else(|| {
                r.columns()
                    .next()
                    .and_then(|c| r.get(c))
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
            })
        }))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Capital a city belongs to.
    ///
    /// Exact normalized match first, then compound names: `"Bolzano - Bozen"`
    /// folds into `"bolzano"`, `"Milano Centrale"` into `"milano"` (longest
    /// entry wins). A short city that prefixes exactly one entry also folds.
    /// With an empty set every non-blank city is its own key.
    pub fn resolve(&self, city: &str) -> Option<CapitalKey> {
        let norm = normalize_text(city);
        if norm.is_empty() {
            return None;
        }
        if self.entries.is_empty() {
            return Some(CapitalKey { key: norm, display: city.trim().to_string() });
        }
        let to_key = |(k, d): (&String, &String)| CapitalKey { key: k.clone(), display: d.clone() };
        if let Some(hit) = self.entries.get_key_value(&norm) {
            return Some(to_key(hit));
        }
        if let Some(hit) = self
            .entries
            .iter()
            .filter(|(k, _)| has_prefix_word(&norm, k))
            .max_by_key(|(k, _)| k.len())
        {
            return Some(to_key(hit));
        }
        let mut longer = self.entries.iter().filter(|(k, _)| has_prefix_word(k, &norm));
        match (longer.next(), longer.next()) {
            (Some(hit), None) => Some(to_key(hit)),
            _ => None,
        }
    }
}

/// Station lookup rebuilt wholesale on every data load.
#[derive(Debug, Clone, Default)]
pub struct StationDirectory {
    refs: HashMap<String, StationRef>,
    capitals: CapoluogoSet,
    items: Vec<StationItem>,
    item_of: HashMap<String, usize>,
}

impl StationDirectory {
    /// Build the directory from the station dimension rows, the capital
    /// table and every station code seen in the fact tables. Alias groups
    /// cover the union of dimension codes and `observed_codes`.
    pub fn build<I>(station_rows: &[RawRow], capitals: CapoluogoSet, observed_codes: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut refs: HashMap<String, StationRef> = HashMap::new();
        let mut dropped = 0usize;
        for r in station_rows {
            let Some(code) = r.pick(columns::STATION) else {
                dropped += 1;
                continue;
            };
            let name = r.pick(columns::STATION_NAME).unwrap_or("").to_string();
            let city = r.pick(columns::CITY).unwrap_or("").to_string();
            let coords = Coords::parse(r.pick(columns::LAT), r.pick(columns::LON));
            let e = refs.entry(code.to_string()).or_insert_with(|| StationRef {
                code: code.to_string(),
                name: String::new(),
                city: String::new(),
                coords: None,
            });
            if e.name.is_empty() {
                e.name = name;
            }
            if e.city.is_empty() {
                e.city = city;
            }
            if e.coords.is_none() {
                e.coords = coords;
            }
        }
        if dropped > 0 {
            debug!(dropped, "station rows without a code");
        }

        let mut dir = StationDirectory {
            refs,
            capitals,
            items: Vec::new(),
            item_of: HashMap::new(),
        };
        let mut all_codes: BTreeSet<String> = dir.refs.keys().cloned().collect();
        all_codes.extend(
            observed_codes
                .into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
        );
        let codes: Vec<String> = all_codes.into_iter().collect();
        dir.items = dir.build_alias_groups(&codes);
        for (i, item) in dir.items.iter().enumerate() {
            for code in &item.codes {
                dir.item_of.insert(code.clone(), i);
            }
        }
        dir
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn capitals(&self) -> &CapoluogoSet {
        &self.capitals
    }

    pub fn get(&self, code: &str) -> Option<&StationRef> {
        self.refs.get(code.trim())
    }

    /// Name, city and coordinates for `code`. The name falls back to the
    /// code itself, the city to the station name.
    pub fn resolve(&self, code: &str) -> ResolvedStation {
        self.resolve_with_fallback(code, None)
    }

    /// Like [`resolve`](Self::resolve) but with a name carried by the data
    /// row, used before falling back to the code.
    pub fn resolve_with_fallback(
        &self,
        code: &str,
        fallback_name: Option<&str>,
    ) -> ResolvedStation {
        let code = code.trim();
        let r = self.refs.get(code);
        let name = r
            .map(|r| r.name.trim())
            .filter(|n| !n.is_empty())
            .or_else(|| fallback_name.map(str::trim).filter(|n| !n.is_empty()))
            .unwrap_or(code)
            .to_string();
        let city = r
            .map(|r| r.city.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| name.clone());
        ResolvedStation {
            code: code.to_string(),
            name,
            city,
            coords: r.and_then(|r| r.coords),
        }
    }

    pub fn coords(&self, code: &str) -> Option<Coords> {
        self.get(code).and_then(|r| r.coords)
    }

    /// Group `codes` by normalized display name, one item per distinct name.
    ///
    /// The representative is a code with coordinates when the group has one,
    /// otherwise the smallest code. Items are sorted by normalized name.
    pub fn build_alias_groups(&self, codes: &[String]) -> Vec<StationItem> {
        let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for code in codes {
            let code = code.trim();
            if code.is_empty() {
                continue;
            }
            let name = self.resolve(code).name;
            groups.entry(normalize_text(&name)).or_default().insert(code.to_string());
        }

        groups
            .into_values()
            .map(|codes| {
                let representative_code = codes
                    .iter()
                    .find(|c| self.coords(c).is_some())
                    .or_else(|| codes.iter().next())
                    .cloned()
                    .unwrap_or_default();
                let name = self.resolve(&representative_code).name;
                let mut needle = name.clone();
                for c in &codes {
                    needle.push(' ');
                    needle.push_str(c);
                }
                StationItem {
                    representative_code,
                    name,
                    codes,
                    search_key: normalize_text(&needle),
                }
            })
            .collect()
    }

    /// Every alias group known to the directory.
    pub fn items(&self) -> &[StationItem] {
        &self.items
    }

    /// Alias group containing `code`.
    pub fn item_for(&self, code: &str) -> Option<&StationItem> {
        self.item_of.get(code.trim()).map(|&i| &self.items[i])
    }

    /// All codes that denote the same logical station as `code` (at least
    /// `code` itself).
    pub fn alias_codes(&self, code: &str) -> BTreeSet<String> {
        match self.item_for(code) {
            Some(item) => item.codes.clone(),
            None => BTreeSet::from([code.trim().to_string()]),
        }
    }

    /// Representative code of the alias group containing `code`.
    pub fn canonical_code(&self, code: &str) -> String {
        match self.item_for(code) {
            Some(item) => item.representative_code.clone(),
            None => code.trim().to_string(),
        }
    }

    /// Capital city the station belongs to, if any. Stations missing from
    /// the dimension table fall back to `fallback_name`, then to the code.
    pub fn capital_of(&self, code: &str, fallback_name: Option<&str>) -> Option<CapitalKey> {
        let resolved = self.resolve_with_fallback(code, fallback_name);
        self.capitals.resolve(&resolved.city)
    }

    /// Items whose search key contains the normalized `query`.
    pub fn search<'a>(items: &'a [StationItem], query: &str) -> Vec<&'a StationItem> {
        items.iter().filter(|it| it.matches_query(query)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::parse_csv;

    fn directory(capitals: &[&str]) -> StationDirectory {
        let rows = parse_csv(
            "cod_stazione,nome_stazione,citta,lat,lon\n\
             S01645,Milano Centrale,Milano,\"45,4864\",9.2042\n\
             S01700,MILANO CENTRALE,,,\n\
             S01529,Bergamo,Bergamo,45.6906,9.6752\n\
             S08409,Roma Termini,Roma,abc,12.5\n",
        );
        StationDirectory::build(
            &rows,
            CapoluogoSet::from_names(capitals.iter().copied()),
            vec!["S99999".to_string()],
        )
    }

    #[test]
    fn test_resolve_fallbacks() {
        let dir = directory(&[]);
        let r = dir.resolve("S01645");
        assert_eq!(r.name, "Milano Centrale");
        assert_eq!(r.city, "Milano");
        assert_eq!(r.coords, Some(Coords { lat: 45.4864, lon: 9.2042 }));

        let unknown = dir.resolve(" S99999 ");
        assert_eq!(unknown.name, "S99999");
        assert_eq!(unknown.city, "S99999");
        assert!(unknown.coords.is_none());

        let no_city = dir.resolve("S01700");
        assert_eq!(no_city.city, "MILANO CENTRALE");
    }

    #[test]
    fn test_invalid_coordinates_are_absent_not_zero() {
        let dir = directory(&[]);
        assert!(dir.coords("S08409").is_none());
        assert!(Coords::parse(Some("0"), Some("0")).is_some());
        assert!(Coords::parse(Some("91"), Some("0")).is_none());
        assert!(Coords::parse(Some("45.1"), None).is_none());
    }

    #[test]
    fn test_alias_groups_share_normalized_name() {
        let dir = directory(&[]);
        let item = dir.item_for("S01700").unwrap();
        assert_eq!(item.codes.len(), 2);
        assert_eq!(item.representative_code, "S01645");
        assert_eq!(dir.canonical_code("S01700"), "S01645");
        assert!(dir.alias_codes("S01645").contains("S01700"));
        assert_eq!(dir.alias_codes("ZZZ"), BTreeSet::from(["ZZZ".to_string()]));
        assert!(item.search_key.contains("s01700"));
    }

    #[test]
    fn test_search_items() {
        let dir = directory(&[]);
        let hits = StationDirectory::search(dir.items(), "milàno");
        assert_eq!(hits.len(), 1);
        assert_eq!(StationDirectory::search(dir.items(), "").len(), dir.items().len());
        assert_eq!(StationDirectory::search(dir.items(), "s01529")[0].name, "Bergamo");
    }

    #[test]
    fn test_capital_resolution() {
        let caps =
            CapoluogoSet::from_names(["Milano", "Bolzano", "Reggio Calabria", "Reggio Emilia"]);
        assert_eq!(caps.resolve("MILANO").unwrap().key, "milano");
        assert_eq!(caps.resolve("Milano Centrale").unwrap().display, "Milano");
        assert_eq!(caps.resolve("Bolzano - Bozen").unwrap().key, "bolzano");
        assert!(caps.resolve("Bergamo").is_none());
        assert!(caps.resolve("Reggio").is_none());
        assert!(caps.resolve("Milanofiori").is_none());
        assert!(caps.resolve("").is_none());
    }

    #[test]
    fn test_empty_capital_set_fails_open() {
        let dir = directory(&[]);
        assert_eq!(dir.capital_of("S01529", None).unwrap().key, "bergamo");
        let dir = directory(&["Milano"]);
        assert!(dir.capital_of("S01529", None).is_none());
        assert_eq!(dir.capital_of("S01700", None).unwrap().key, "milano");
        assert_eq!(dir.capital_of("X99", Some("Milano")).unwrap().key, "milano");
    }

    #[test]
    fn test_capitals_from_rows() {
        let rows = parse_csv("capoluogo\nTorino\nForlì\n\n");
        let caps = CapoluogoSet::from_rows(&rows);
        assert_eq!(caps.len(), 2);
        assert!(caps.resolve("Forli").is_some());
    }
}
