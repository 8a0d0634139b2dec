use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Full-frame effect applied to the selected part of the frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    #[default]
    Grayscale,
    Blur,
    Sepia,
}

/// One entry of the filter listing shown to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FilterDescriptor {
    pub id: FilterType,
    pub name: &'static str,
    pub description: &'static str,
}

impl FilterType {
    pub const ALL: [FilterType; 3] = [FilterType::Grayscale, FilterType::Blur, FilterType::Sepia];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterType::Grayscale => "grayscale",
            FilterType::Blur => "blur",
            FilterType::Sepia => "sepia",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            FilterType::Grayscale => "Grayscale",
            FilterType::Blur => "Blur",
            FilterType::Sepia => "Sepia",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            FilterType::Grayscale => "Convert to black and white",
            FilterType::Blur => "Apply Gaussian blur effect",
            FilterType::Sepia => "Apply vintage sepia tone",
        }
    }

    pub fn catalog() -> Vec<FilterDescriptor> {
        Self::ALL
            .iter()
            .map(|f| FilterDescriptor {
                id: *f,
                name: f.display_name(),
                description: f.description(),
            })
            .collect()
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grayscale" => Ok(FilterType::Grayscale),
            "blur" => Ok(FilterType::Blur),
            "sepia" => Ok(FilterType::Sepia),
            other => Err(format!(
                "Filter type must be one of: grayscale, blur, sepia, got '{other}'"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("grayscale", FilterType::Grayscale)]
    #[case("blur", FilterType::Blur)]
    #[case("sepia", FilterType::Sepia)]
    fn test_parse(#[case] input: &str, #[case] expected: FilterType) {
        assert_eq!(input.parse::<FilterType>().unwrap(), expected);
        assert_eq!(expected.to_string(), input);
    }

    #[test]
    fn test_parse_unknown_lists_choices() {
        let err = "vignette".parse::<FilterType>().unwrap_err();
        assert!(err.contains("grayscale, blur, sepia"));
        assert!(err.contains("vignette"));
    }

    #[test]
    fn test_catalog_serializes_ids_lowercase() {
        let json = serde_json::to_value(FilterType::catalog()).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 3);
        assert_eq!(json[1]["id"], "blur");
        assert_eq!(json[2]["name"], "Sepia");
        assert_eq!(json[0]["description"], "Convert to black and white");
    }
}
