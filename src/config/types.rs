use mediaforge_media::isobmff::HEADER_LENGTH;
use mediaforge_media::Mp4Muxer;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,

    #[serde(default)]
    pub mux: MuxConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputConfig {
    /// Bytes read from the input and fed to the parser per step
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_chunk_size() -> usize {
    64 * 1024
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MuxConfig {
    /// `©too` item written into the movie metadata (defaults to the
    /// program name and version)
    #[serde(default)]
    pub tool: Option<String>,

    /// `©cmt` item written into the movie metadata
    #[serde(default)]
    pub comment: Option<String>,

    /// Exact size of the written movie box
    #[serde(default = "default_header_length")]
    pub header_length: usize,
}

fn default_header_length() -> usize {
    HEADER_LENGTH
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            tool: None,
            comment: None,
            header_length: default_header_length(),
        }
    }
}

impl MuxConfig {
    /// A muxer carrying this section's metadata and reservation.
    pub fn muxer(&self) -> Mp4Muxer {
        let mut muxer = Mp4Muxer::new().with_header_length(self.header_length);
        if let Some(ref tool) = self.tool {
            muxer = muxer.with_tool(tool.clone());
        }
        if let Some(ref comment) = self.comment {
            muxer = muxer.with_comment(comment.clone());
        }
        muxer
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Print `probe` results as JSON by default
    #[serde(default)]
    pub json: bool,
}
