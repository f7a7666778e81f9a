//! Request/response framing between the frontend and the backend host.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// A single request sent from the frontend to the backend host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub cmd: String,
    pub kwargs: BTreeMap<String, Value>,
    pub result: PathBuf,
}

impl Request {
    pub fn new(cmd: impl Into<String>, kwargs: BTreeMap<String, Value>, result: PathBuf) -> Self {
        Self {
            cmd: cmd.into(),
            kwargs,
            result,
        }
    }

    /// Encode as a single `\r\n`-terminated JSON line, the framing `host.py`'s
    /// `read_line` loop expects on stdin.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut line = serde_json::to_vec(self)?;
        line.extend_from_slice(b"\r\n");
        Ok(line)
    }
}

/// The decoded contents of a response file written by the backend host.
#[derive(Debug, Clone)]
pub enum Response {
    Return(Value),
    Failure {
        code: Option<i64>,
        exc_type: String,
        exc_msg: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawResponse {
    Return {
        #[serde(rename = "return")]
        value: Value,
    },
    Failure {
        code: Option<i64>,
        exc_type: String,
        exc_msg: String,
    },
}

impl Response {
    /// Read and parse the response file at `path`.
    ///
    /// Callers are responsible for only invoking this once the file is known to exist
    /// (or the child has exited, which is reported separately) — an absent file here
    /// surfaces as a plain I/O error rather than a [`BackendFailure`] so the caller can
    /// attach whatever stdio it captured.
    pub fn decode(path: &Path) -> Result<Self, Error> {
        let raw = fs_err::read_to_string(path)?;
        let parsed: RawResponse = serde_json::from_str(&raw)?;
        Ok(match parsed {
            RawResponse::Return { value } => Self::Return(value),
            RawResponse::Failure {
                code,
                exc_type,
                exc_msg,
            } => Self::Failure {
                code,
                exc_type,
                exc_msg,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe_reader::{Line, PipeReader};
    use tokio::io::duplex;

    #[tokio::test]
    async fn request_encoding_round_trips_through_pipe_reader() {
        let mut kwargs = BTreeMap::new();
        kwargs.insert("config_settings".to_string(), Value::Null);
        let request = Request::new("build_wheel", kwargs, PathBuf::from("/tmp/result.json"));
        let encoded = request.encode().unwrap();

        let (mut w, r) = duplex(4096);
        tokio::io::AsyncWriteExt::write_all(&mut w, &encoded)
            .await
            .unwrap();
        drop(w);

        let mut reader = PipeReader::new(r);
        let Line::Data(line) = reader.read_line().await.unwrap() else {
            panic!("expected a data line");
        };
        let decoded: Request = serde_json::from_slice(&line).unwrap();
        assert_eq!(decoded.cmd, "build_wheel");
    }

    #[test]
    fn decodes_success_response() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        fs_err::write(&path, r#"{"return": "demo-1.0.0.whl"}"#).unwrap();
        let response = Response::decode(&path).unwrap();
        match response {
            Response::Return(value) => assert_eq!(value, Value::String("demo-1.0.0.whl".into())),
            Response::Failure { .. } => panic!("expected success"),
        }
    }

    #[test]
    fn decodes_failure_response() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        fs_err::write(
            &path,
            r#"{"code": 1, "exc_type": "MissingCommand", "exc_msg": "nope"}"#,
        )
        .unwrap();
        let response = Response::decode(&path).unwrap();
        match response {
            Response::Failure { code, exc_type, .. } => {
                assert_eq!(exc_type, "MissingCommand");
                assert_eq!(code, Some(1));
            }
            Response::Return(_) => panic!("expected failure"),
        }
    }
}
