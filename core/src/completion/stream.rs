use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

use crate::error::{BackendKind, CoreError, Result};

/// One line of `claude --output-format stream-json` output.
///
/// Two record shapes carry text; everything else (init, result, tool
/// records) lands in `Unrecognized` and is ignored.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamRecord {
    /// `{"type":"content_block_delta","delta":{"text":"..."}}`
    ContentBlockDelta {
        #[serde(default)]
        delta: Delta,
    },
    /// `{"type":"assistant","message":{"content":[{"text":"..."}]}}`
    Assistant {
        #[serde(default)]
        message: AssistantMessage,
    },
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct Delta {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct ContentBlock {
    #[serde(default)]
    pub text: Option<String>,
}

impl StreamRecord {
    /// Parse one output line. Blank and invalid lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_str(line) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!("Skipping non-JSON stream line: {e}");
                None
            }
        }
    }

    /// Non-empty text fragments carried by this record.
    pub fn into_fragments(self) -> Vec<String> {
        match self {
            StreamRecord::ContentBlockDelta { delta } => {
                delta.text.into_iter().filter(|t| !t.is_empty()).collect()
            }
            StreamRecord::Assistant { message } => message
                .content
                .into_iter()
                .filter_map(|block| block.text)
                .filter(|t| !t.is_empty())
                .collect(),
            StreamRecord::Unrecognized => Vec::new(),
        }
    }
}

/// How a stdout parse loop finished.
#[derive(Debug, PartialEq, Eq)]
pub enum StreamEnd {
    /// The process closed stdout.
    Eof,
    /// The consumer dropped its receiver; the caller should stop the process.
    ReceiverGone,
}

/// Parse newline-delimited stream records and forward each text fragment.
///
/// Fragments are sent as soon as their line is read. Returns early when the
/// receiver is dropped so the caller can tear the process down.
pub async fn parse_cli_stream<R>(output: R, tx: &mpsc::Sender<Result<String>>) -> Result<StreamEnd>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(output).lines();

    loop {
        let line = tokio::select! {
            line = reader.next_line() => line.map_err(|e| {
                CoreError::backend(BackendKind::Cli, None, format!("Failed to read stdout: {e}"))
            })?,
            _ = tx.closed() => return Ok(StreamEnd::ReceiverGone),
        };

        let Some(line) = line else {
            return Ok(StreamEnd::Eof);
        };

        let Some(record) = StreamRecord::parse(&line) else {
            continue;
        };

        for fragment in record.into_fragments() {
            if tx.send(Ok(fragment)).await.is_err() {
                return Ok(StreamEnd::ReceiverGone);
            }
        }
    }
}
