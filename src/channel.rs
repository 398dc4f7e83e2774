use serde::{Deserialize, Serialize};

/// A continuous live stream source. No duration, no seeking, no progress
/// tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveChannel {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
}

impl LiveChannel {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            description: description.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_without_description() {
        let channel: LiveChannel =
            serde_json::from_str(r#"{"name": "FIP", "url": "https://stream.example/fip"}"#)
                .unwrap();
        assert_eq!(channel.name, "FIP");
        assert_eq!(channel.description, "");
    }
}
