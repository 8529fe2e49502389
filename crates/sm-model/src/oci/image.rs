use serde::{Deserialize, Serialize};

/// Image descriptor shipped with a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    #[serde(default)]
    pub config: ImageConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
}

impl ImageSpec {
    /// Image spec whose entry command is `cmd`.
    pub fn with_cmd<I, S>(cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            config: ImageConfig {
                cmd: cmd.into_iter().map(Into::into).collect(),
                ..Default::default()
            },
        }
    }

    /// First element of the declared command, if any.
    pub fn entry_command(&self) -> Option<&str> {
        self.config.cmd.first().map(String::as_str)
    }
}
