use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Category → keyword list table backing the rule adapter, the entity
/// adapter's density signal, and the tag vocabulary used by the quality
/// scorer.
#[derive(Debug, Clone)]
pub struct KeywordTable {
    categories: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeywordProfile {
    category: String,
    keywords: Vec<String>,
}

impl KeywordTable {
    pub fn builtin() -> Self {
        let mut categories = BTreeMap::new();
        let table: [(&str, &[&str]); 6] = [
            (
                "satellite_data",
                &[
                    "satellite",
                    "sentinel",
                    "landsat",
                    "modis",
                    "imagery",
                    "orbital",
                    "swath",
                    "multispectral",
                ],
            ),
            (
                "climate_data",
                &[
                    "climate",
                    "temperature anomaly",
                    "precipitation",
                    "greenhouse",
                    "emission",
                    "reanalysis",
                    "era5",
                ],
            ),
            (
                "elevation_data",
                &["elevation", "terrain", "lidar", "srtm", "dem", "altitude"],
            ),
            (
                "weather_data",
                &[
                    "weather",
                    "forecast",
                    "radar",
                    "wind speed",
                    "humidity",
                    "barometric",
                ],
            ),
            (
                "ocean_data",
                &[
                    "ocean",
                    "sea surface",
                    "salinity",
                    "bathymetry",
                    "tide",
                    "buoy",
                ],
            ),
            (
                "land_cover",
                &[
                    "land cover",
                    "land use",
                    "vegetation",
                    "ndvi",
                    "forest",
                    "crop",
                ],
            ),
        ];
        for (category, keywords) in table {
            categories.insert(
                category.to_string(),
                keywords.iter().map(|k| k.to_string()).collect(),
            );
        }
        Self { categories }
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    /// Category with the most matching keywords in `text_lower`, with the
    /// match count. Ties resolve to the alphabetically first category.
    pub fn best_match(&self, text_lower: &str) -> Option<(String, usize)> {
        let mut best: Option<(&str, usize)> = None;
        for (category, keywords) in &self.categories {
            let hits = keywords
                .iter()
                .filter(|k| text_lower.contains(k.as_str()))
                .count();
            if hits == 0 {
                continue;
            }
            match best {
                Some((_, n)) if hits <= n => {}
                _ => best = Some((category, hits)),
            }
        }
        best.map(|(c, n)| (c.to_string(), n))
    }

    /// Fraction of keywords, across all categories, present in
    /// `text_lower`. Density signal for the entity adapter.
    pub fn keyword_density(&self, text_lower: &str) -> f32 {
        let total: usize = self.categories.values().map(Vec::len).sum();
        if total == 0 {
            return 0.0;
        }
        let hits: usize = self
            .categories
            .values()
            .flatten()
            .filter(|k| text_lower.contains(k.as_str()))
            .count();
        hits as f32 / total as f32
    }

    /// True when the tag matches the controlled vocabulary.
    pub fn is_known_tag(&self, tag: &str) -> bool {
        let tag = tag.to_lowercase();
        self.categories
            .values()
            .flatten()
            .any(|k| k == &tag || tag.contains(k.as_str()) || k.contains(tag.as_str()))
    }

    /// Merges `*.toml` keyword profiles from a directory into the table.
    /// Returns how many profiles were loaded; a missing directory loads
    /// zero.
    pub fn extend_from_dir(&mut self, dir: &Path) -> anyhow::Result<usize> {
        if !dir.exists() {
            return Ok(0);
        }
        let mut loaded = 0;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if entry.path().extension().and_then(|e| e.to_str()) == Some("toml") {
                let content = fs::read_to_string(entry.path())?;
                let profile: KeywordProfile = toml::from_str(&content)?;
                let slot = self.categories.entry(profile.category).or_default();
                for keyword in profile.keywords {
                    let keyword = keyword.to_lowercase();
                    if !slot.contains(&keyword) {
                        slot.push(keyword);
                    }
                }
                loaded += 1;
            }
        }
        Ok(loaded)
    }
}
