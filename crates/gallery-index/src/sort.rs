use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thumbnail_cache::SourceFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Name,
    /// Modification time
    Date,
    Size,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// How the gallery lists its entries. Ties always break by path, ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SortOrder {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl SortOrder {
    pub const fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }

    pub fn compare(&self, a: &SourceFile, b: &SourceFile) -> Ordering {
        let primary = match self.key {
            SortKey::Name => a.path.cmp(&b.path),
            SortKey::Date => a.modified.cmp(&b.modified),
            SortKey::Size => a.size.cmp(&b.size),
        };
        let primary = match self.direction {
            SortDirection::Ascending => primary,
            SortDirection::Descending => primary.reverse(),
        };
        primary.then_with(|| a.path.cmp(&b.path))
    }

    /// Sort in place using the snapshot attributes; nothing is re-read from disk
    pub fn apply(&self, files: &mut [SourceFile]) {
        files.sort_by(|a, b| self.compare(a, b));
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match (self.key, self.direction) {
            (SortKey::Name, SortDirection::Ascending) => "name-asc",
            (SortKey::Name, SortDirection::Descending) => "name-desc",
            (SortKey::Date, SortDirection::Descending) => "date-new",
            (SortKey::Date, SortDirection::Ascending) => "date-old",
            (SortKey::Size, SortDirection::Descending) => "size-large",
            (SortKey::Size, SortDirection::Ascending) => "size-small",
        };
        f.write_str(name)
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use SortDirection::*;
        use SortKey::*;

        let order = match s.to_lowercase().replace('_', "-").as_str() {
            "name" | "name-asc" => SortOrder::new(Name, Ascending),
            "name-desc" => SortOrder::new(Name, Descending),
            "date" | "date-new" => SortOrder::new(Date, Descending),
            "date-old" => SortOrder::new(Date, Ascending),
            "size" | "size-large" => SortOrder::new(Size, Descending),
            "size-small" => SortOrder::new(Size, Ascending),
            _ => {
                return Err(format!(
                    "Invalid sort order: {}. Valid options: name-asc, name-desc, date-new, date-old, size-large, size-small",
                    s
                ))
            }
        };
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{Duration, UNIX_EPOCH};
    use thumbnail_cache::FileKind;

    fn file(name: &str, size: u64, secs: u64) -> SourceFile {
        SourceFile {
            path: PathBuf::from("/photos").join(name),
            size,
            modified: UNIX_EPOCH + Duration::from_secs(secs),
            kind: FileKind::Image,
        }
    }

    fn names(files: &[SourceFile]) -> Vec<String> {
        files.iter().map(|f| f.file_name().into_owned()).collect()
    }

    #[test]
    fn test_each_order() {
        let files = vec![file("b.jpg", 30, 200), file("a.jpg", 10, 300), file("c.jpg", 20, 100)];

        let cases = [
            ("name-asc", vec!["a.jpg", "b.jpg", "c.jpg"]),
            ("name-desc", vec!["c.jpg", "b.jpg", "a.jpg"]),
            ("date-new", vec!["a.jpg", "b.jpg", "c.jpg"]),
            ("date-old", vec!["c.jpg", "b.jpg", "a.jpg"]),
            ("size-large", vec!["b.jpg", "c.jpg", "a.jpg"]),
            ("size-small", vec!["a.jpg", "c.jpg", "b.jpg"]),
        ];
        for (order, expected) in cases {
            let mut sorted = files.clone();
            order.parse::<SortOrder>().unwrap().apply(&mut sorted);
            assert_eq!(names(&sorted), expected, "order {}", order);
        }
    }

    #[test]
    fn test_ties_break_by_path() {
        let mut files = vec![file("z.jpg", 5, 1), file("m.jpg", 5, 1), file("a.jpg", 5, 1)];
        "size-large".parse::<SortOrder>().unwrap().apply(&mut files);
        assert_eq!(names(&files), vec!["a.jpg", "m.jpg", "z.jpg"]);
    }

    #[test]
    fn test_parse_and_display() {
        for name in ["name-asc", "name-desc", "date-new", "date-old", "size-large", "size-small"] {
            assert_eq!(name.parse::<SortOrder>().unwrap().to_string(), name);
        }
        assert_eq!("date_new".parse::<SortOrder>().unwrap().to_string(), "date-new");
        assert!("shuffle".parse::<SortOrder>().is_err());
    }
}
