use anyhow::Context;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;

/// COCO class names, in the order used by models trained on COCO 2017.
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// Class id to name lookup owned by the detector.
///
/// Serializes as a JSON object keyed by class id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LabelMap {
    names: BTreeMap<u32, String>,
}

impl LabelMap {
    pub fn new(names: BTreeMap<u32, String>) -> Self {
        Self { names }
    }

    /// Assigns ids 0..n in iteration order.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = (0u32..).zip(names.into_iter().map(Into::into)).collect();
        Self { names }
    }

    pub fn coco() -> Self {
        Self::from_names(COCO_CLASSES)
    }

    /// Reads one class name per line. Blank lines are skipped.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read labels file {}", path.display()))?;

        let labels = Self::from_names(
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );

        if labels.is_empty() {
            anyhow::bail!("Labels file {} contains no class names", path.display());
        }

        Ok(labels)
    }

    /// Parses the `names` entry that Ultralytics writes into exported model
    /// metadata, a Python dict literal such as `{0: 'person', 1: "driver's seat"}`.
    pub fn parse_model_metadata(raw: &str) -> anyhow::Result<Self> {
        let body = raw
            .trim()
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(|| anyhow::anyhow!("Class names metadata is not a dict literal"))?;

        let mut names = BTreeMap::new();
        let mut rest = body.trim_start();

        while !rest.is_empty() {
            let colon = rest
                .find(':')
                .ok_or_else(|| anyhow::anyhow!("Missing ':' after class id in {:?}", rest))?;
            let id: u32 = rest[..colon]
                .trim()
                .parse()
                .with_context(|| format!("Invalid class id {:?}", rest[..colon].trim()))?;

            let (name, remainder) = parse_quoted(rest[colon + 1..].trim_start())?;
            names.insert(id, name);

            rest = remainder.trim_start();
            rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
        }

        if names.is_empty() {
            anyhow::bail!("Class names metadata is empty");
        }

        Ok(Self { names })
    }

    pub fn get(&self, class_id: u32) -> Option<&str> {
        self.names.get(&class_id).map(String::as_str)
    }

    /// Name for `class_id`, or `class_<id>` for ids the model never declared.
    pub fn name(&self, class_id: u32) -> Cow<'_, str> {
        match self.get(class_id) {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(format!("class_{}", class_id)),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names ordered by class id.
    pub fn names(&self) -> Vec<String> {
        self.names.values().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.names.iter().map(|(id, name)| (*id, name.as_str()))
    }
}

/// Splits a leading Python string literal off `input`.
fn parse_quoted(input: &str) -> anyhow::Result<(String, &str)> {
    let mut chars = input.char_indices();
    let quote = match chars.next() {
        Some((_, q @ ('\'' | '"'))) => q,
        _ => anyhow::bail!("Expected quoted class name at {:?}", input),
    };

    let mut name = String::new();
    let mut escaped = false;
    for (idx, ch) in chars {
        if escaped {
            name.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == quote {
            return Ok((name, &input[idx + ch.len_utf8()..]));
        } else {
            name.push(ch);
        }
    }

    anyhow::bail!("Unterminated class name in {:?}", input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_coco_has_80_classes() {
        let labels = LabelMap::coco();
        assert_eq!(labels.len(), 80);
        assert_eq!(labels.get(0), Some("person"));
        assert_eq!(labels.get(79), Some("toothbrush"));
    }

    #[test]
    fn test_parse_ultralytics_metadata() {
        let labels =
            LabelMap::parse_model_metadata("{0: 'debris', 1: 'satellite', 2: 'rocket body'}")
                .unwrap();

        assert_eq!(labels.len(), 3);
        assert_eq!(labels.get(0), Some("debris"));
        assert_eq!(labels.get(2), Some("rocket body"));
        assert_eq!(labels.names(), vec!["debris", "satellite", "rocket body"]);
    }

    #[test]
    fn test_parse_metadata_with_double_quotes_and_escapes() {
        let labels =
            LabelMap::parse_model_metadata(r#"{0: "driver's seat", 1: 'it\'s', 2: 'a, b'}"#)
                .unwrap();

        assert_eq!(labels.get(0), Some("driver's seat"));
        assert_eq!(labels.get(1), Some("it's"));
        assert_eq!(labels.get(2), Some("a, b"));
    }

    #[test]
    fn test_parse_metadata_keeps_sparse_ids() {
        let labels = LabelMap::parse_model_metadata("{3: 'a', 10: 'b',}").unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.get(3), Some("a"));
        assert_eq!(labels.get(10), Some("b"));
        assert_eq!(labels.get(0), None);
    }

    #[test]
    fn test_parse_metadata_rejects_malformed_input() {
        assert!(LabelMap::parse_model_metadata("['a', 'b']").is_err());
        assert!(LabelMap::parse_model_metadata("{}").is_err());
        assert!(LabelMap::parse_model_metadata("{x: 'a'}").is_err());
        assert!(LabelMap::parse_model_metadata("{0: 'unterminated}").is_err());
    }

    #[test]
    fn test_unknown_id_falls_back_to_generic_name() {
        let labels = LabelMap::from_names(["cat"]);
        assert_eq!(labels.name(0), "cat");
        assert_eq!(labels.name(7), "class_7");
    }

    #[test]
    fn test_from_file_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "debris\n\n  satellite  \n").unwrap();

        let labels = LabelMap::from_file(file.path()).unwrap();
        assert_eq!(labels.names(), vec!["debris", "satellite"]);
        assert_eq!(labels.get(1), Some("satellite"));
    }

    #[test]
    fn test_from_file_rejects_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(LabelMap::from_file(file.path()).is_err());
    }

    #[test]
    fn test_serializes_as_id_keyed_object() {
        let labels = LabelMap::from_names(["a", "b"]);
        let json = serde_json::to_value(&labels).unwrap();
        assert_eq!(json, serde_json::json!({"0": "a", "1": "b"}));
    }
}
