use serde::Deserialize;

use crate::data_capture::types::Feed;

/// How the capture tool is invoked, shared by both feeds.
#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Executable name or path of the capture tool.
    pub program: String,
    /// Flags selecting full-payload console output.
    pub mode_flags: Vec<String>,
    /// Sink for the tool's report file, passed as `-X<path>`.
    pub null_output: Option<String>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            program: String::from("tcpflow"),
            mode_flags: vec![String::from("-BC")],
            null_output: Some(String::from("/dev/null")),
        }
    }
}

impl CaptureSettings {
    /// Builds the argument vector for one feed: mode flags, null-output flag, filter.
    pub fn arguments(&self, filter: &str) -> Vec<String> {
        let mut args = self.mode_flags.clone();
        if let Some(ref sink) = self.null_output {
            args.push(format!("-X{}", sink));
        }
        args.push(filter.to_string());
        args
    }
}

/// Traffic filter expression per feed.
#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct FeedFilters {
    pub community: String,
    pub game: String,
}

impl Default for FeedFilters {
    fn default() -> Self {
        Self {
            community: String::from("tcp and src 164.132.202.12 and greater 69"),
            // game ports seen so far: 44440, 44444, 6112, 3724, 5555
            game: String::from(
                "tcp and port 6112 or port 44440 or port 44444 or port 3724 \
                 or port 5555 and greater 69 and inbound",
            ),
        }
    }
}

impl FeedFilters {
    pub fn for_feed(&self, feed: Feed) -> &str {
        match feed {
            Feed::Community => &self.community,
            Feed::Game => &self.game,
        }
    }
}
