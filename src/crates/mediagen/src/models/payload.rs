//! Typed prompt payloads
//!
//! A content record stores its generation request as JSON text. These types
//! give that JSON a shape. Parsing comes in two flavours: lenient for display,
//! where anything malformed falls back to defaults, and strict for generation,
//! where malformed input is an error.

use crate::error::{MediaError, Result};
use crate::models::prompt::PromptType;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

/// Image generation request
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagePromptData {
    pub prompt: String,
    pub negative_prompt: String,
    pub style_tags: Vec<String>,
    pub technical_params: TechnicalParams,
    pub composition: Composition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TechnicalParams {
    pub aspect_ratio: String,
    pub quality: String,
    pub mood: String,
}

impl Default for TechnicalParams {
    fn default() -> Self {
        Self {
            aspect_ratio: "16:9".to_string(),
            quality: "high".to_string(),
            mood: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Composition {
    pub subject: String,
    pub background: String,
    pub lighting: String,
}

impl ImagePromptData {
    /// Payload fields copied into every image artifact's metadata
    pub fn metadata(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("prompt".into(), json!(self.prompt));
        map.insert("negative_prompt".into(), json!(self.negative_prompt));
        map.insert("style_tags".into(), json!(self.style_tags));
        map.insert("aspect_ratio".into(), json!(self.technical_params.aspect_ratio));
        map.insert("quality".into(), json!(self.technical_params.quality));
        map.insert("mood".into(), json!(self.technical_params.mood));
        map
    }
}

/// Song generation request
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LyricsPromptData {
    pub title: String,
    pub genre: String,
    pub mood: String,
    pub tempo: String,
    pub structure: Vec<LyricSection>,
    pub metadata: LyricsMetadata,
}

/// One section of a song (verse, chorus, bridge...)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LyricSection {
    #[serde(rename = "type")]
    pub section_type: String,
    #[serde(deserialize_with = "section_number")]
    pub number: Option<String>,
    pub lyrics: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LyricsMetadata {
    pub key: String,
    pub time_signature: String,
    pub vocal_style: String,
    pub instrumentation: Vec<String>,
}

impl Default for LyricsMetadata {
    fn default() -> Self {
        Self {
            key: String::new(),
            time_signature: "4/4".to_string(),
            vocal_style: String::new(),
            instrumentation: Vec::new(),
        }
    }
}

// Producers write section numbers both as `1` and as `"1"`.
fn section_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(serde::de::Error::custom(format!(
            "section number must be a number or string, got {}",
            other
        ))),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}

impl LyricSection {
    /// Section header such as `[Verse 1]` or `[Chorus]`
    pub fn header(&self) -> String {
        let name = match self.section_type.trim() {
            "" => "Section".to_string(),
            t => capitalize(t),
        };
        match &self.number {
            Some(n) => format!("[{} {}]", name, n),
            None => format!("[{}]", name),
        }
    }
}

impl LyricsPromptData {
    /// Render every section as `[Type N]\n<lyrics>\n`, sections separated by a blank line
    pub fn full_lyrics(&self) -> String {
        self.structure
            .iter()
            .map(|section| format!("{}\n{}\n", section.header(), section.lyrics))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Style summary for the audio engine, one `Label: value` line per non-empty field
    pub fn tags(&self) -> String {
        let instrumentation = self.metadata.instrumentation.join(", ");
        [
            ("Genre", self.genre.as_str()),
            ("Mood", self.mood.as_str()),
            ("Tempo", self.tempo.as_str()),
            ("Key", self.metadata.key.as_str()),
            ("Vocal Style", self.metadata.vocal_style.as_str()),
            ("Instrumentation", instrumentation.as_str()),
        ]
        .iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(label, value)| format!("{}: {}", label, value))
        .collect::<Vec<_>>()
        .join("\n")
    }

    /// Payload fields copied into every audio artifact's metadata
    pub fn metadata_fields(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("title".into(), json!(self.title));
        map.insert("genre".into(), json!(self.genre));
        map.insert("mood".into(), json!(self.mood));
        map.insert("tempo".into(), json!(self.tempo));
        map.insert("key".into(), json!(self.metadata.key));
        map.insert("time_signature".into(), json!(self.metadata.time_signature));
        map.insert("vocal_style".into(), json!(self.metadata.vocal_style));
        map.insert("instrumentation".into(), json!(self.metadata.instrumentation));
        map
    }
}

/// A parsed content record
#[derive(Debug, Clone, PartialEq)]
pub enum PromptPayload {
    Image(ImagePromptData),
    Lyrics(LyricsPromptData),
}

impl PromptPayload {
    /// Parse for generation. Malformed JSON, a non-object document or a
    /// field of the wrong type is an error.
    pub fn parse_strict(prompt_type: PromptType, content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| MediaError::payload(format!("content is not valid JSON: {}", e)))?;

        if !value.is_object() {
            return Err(MediaError::payload(format!(
                "content must be a JSON object, got {}",
                json_kind(&value)
            )));
        }

        let payload = match prompt_type {
            PromptType::Image => Self::Image(
                serde_json::from_value(value)
                    .map_err(|e| MediaError::payload(format!("invalid image prompt: {}", e)))?,
            ),
            PromptType::Lyrics => Self::Lyrics(
                serde_json::from_value(value)
                    .map_err(|e| MediaError::payload(format!("invalid lyrics prompt: {}", e)))?,
            ),
        };
        Ok(payload)
    }

    /// Parse for display. Never fails; anything unparseable yields defaults.
    pub fn parse_lenient(prompt_type: PromptType, content: &str) -> Self {
        Self::parse_strict(prompt_type, content).unwrap_or_else(|_| match prompt_type {
            PromptType::Image => Self::Image(ImagePromptData::default()),
            PromptType::Lyrics => Self::Lyrics(LyricsPromptData::default()),
        })
    }

    pub fn prompt_type(&self) -> PromptType {
        match self {
            Self::Image(_) => PromptType::Image,
            Self::Lyrics(_) => PromptType::Lyrics,
        }
    }

    /// Payload fields carried into artifact metadata
    pub fn metadata(&self) -> Map<String, Value> {
        match self {
            Self::Image(data) => data.metadata(),
            Self::Lyrics(data) => data.metadata_fields(),
        }
    }

    /// One-line description for listings
    pub fn summary(&self) -> String {
        match self {
            Self::Image(data) => data.prompt.clone(),
            Self::Lyrics(data) if data.genre.is_empty() => data.title.clone(),
            Self::Lyrics(data) => format!("{} ({})", data.title, data.genre),
        }
    }
}

/// Lenient raw JSON view of a content record: the document if it is an
/// object, an empty object otherwise.
pub fn content_json(content: &str) -> Value {
    match serde_json::from_str::<Value>(content) {
        Ok(value @ Value::Object(_)) => value,
        _ => Value::Object(Map::new()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(kind: &str, number: Option<&str>, lyrics: &str) -> LyricSection {
        LyricSection {
            section_type: kind.to_string(),
            number: number.map(str::to_string),
            lyrics: lyrics.to_string(),
        }
    }

    #[test]
    fn test_full_lyrics_rendering() {
        let data = LyricsPromptData {
            structure: vec![section("verse", Some("1"), "a"), section("chorus", None, "b")],
            ..Default::default()
        };
        assert_eq!(data.full_lyrics(), "[Verse 1]\na\n\n[Chorus]\nb\n");
    }

    #[test]
    fn test_section_type_case_is_normalized() {
        assert_eq!(section("PRE-CHORUS", None, "").header(), "[Pre-chorus]");
        assert_eq!(section("", Some("2"), "").header(), "[Section 2]");
    }

    #[test]
    fn test_section_number_accepts_number_or_string() {
        let data: LyricsPromptData = serde_json::from_str(
            r#"{"structure":[{"type":"verse","number":1,"lyrics":"x"},{"type":"verse","number":"2","lyrics":"y"}]}"#,
        )
        .unwrap();
        assert_eq!(data.structure[0].number.as_deref(), Some("1"));
        assert_eq!(data.structure[1].number.as_deref(), Some("2"));
    }

    #[test]
    fn test_tags_omit_empty_fields() {
        let data = LyricsPromptData {
            genre: "Synthwave".to_string(),
            tempo: "110 BPM".to_string(),
            metadata: LyricsMetadata {
                instrumentation: vec!["synth".to_string(), "drums".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            data.tags(),
            "Genre: Synthwave\nTempo: 110 BPM\nInstrumentation: synth, drums"
        );
    }

    #[test]
    fn test_tags_never_mention_time_signature() {
        let data = LyricsPromptData::default();
        assert_eq!(data.metadata.time_signature, "4/4");
        assert_eq!(data.tags(), "");
    }

    #[test]
    fn test_image_defaults() {
        let payload = PromptPayload::parse_strict(PromptType::Image, r#"{"prompt":"fox"}"#).unwrap();
        match payload {
            PromptPayload::Image(data) => {
                assert_eq!(data.prompt, "fox");
                assert_eq!(data.technical_params.aspect_ratio, "16:9");
                assert_eq!(data.technical_params.quality, "high");
                assert!(data.style_tags.is_empty());
            }
            other => panic!("expected image payload, got {:?}", other),
        }
    }

    #[test]
    fn test_strict_rejects_malformed_and_non_object() {
        assert!(PromptPayload::parse_strict(PromptType::Image, "{not json").is_err());
        let err = PromptPayload::parse_strict(PromptType::Lyrics, "[1, 2]").unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn test_lenient_falls_back_to_defaults() {
        let payload = PromptPayload::parse_lenient(PromptType::Lyrics, "oops");
        assert_eq!(payload, PromptPayload::Lyrics(LyricsPromptData::default()));
        assert_eq!(content_json("oops"), json!({}));
        assert_eq!(content_json(r#"{"a":1}"#), json!({"a": 1}));
    }

    #[test]
    fn test_metadata_fields() {
        let payload = PromptPayload::parse_strict(
            PromptType::Lyrics,
            r#"{"title":"Night Drive","metadata":{"key":"A minor"}}"#,
        )
        .unwrap();
        let meta = payload.metadata();
        assert_eq!(meta["title"], json!("Night Drive"));
        assert_eq!(meta["key"], json!("A minor"));
        assert_eq!(meta["time_signature"], json!("4/4"));
        assert_eq!(payload.summary(), "Night Drive");
    }
}
