//! Ties the framer, reader, handshake, command pipeline and tuple parser
//! together into the single entry point higher layers drive.

use tracing::instrument;

use mapi_common::err::mapi_error::MapiError;
use mapi_common::err::MapiResult;

use crate::commands::{ControlCommand, Language, QueryCommand};
use crate::debug::{DebugSink, DebugTag};
use crate::handshake::{self, Established, NoOptions, OptionsCallback};
use crate::line::LineType;
use crate::reader::LineReader;
use crate::result::{ResultHeader, SoHeaderKind};
use crate::stream::{DownloadStream, UploadStream};
use crate::target::Target;
use crate::tuple::{self, Row};

/// One element of a query response, dispatched from the SOHEADER tag.
pub enum ResponseItem {
    Table { header: ResultHeader, rows: Vec<Row> },
    UpdateCount(i64),
    SchemaChange,
    AutoCommitToggle(bool),
    Prepare(String),
}

pub struct QueryResponse {
    pub items: Vec<ResponseItem>,
    pub warnings: Vec<String>,
}

/// An established MAPI session: the authenticated reader/writer pair plus
/// handshake metadata.
pub struct Session {
    reader: LineReader<crate::framer::Transport>,
    language: Language,
    server_kind: String,
    scratch: Vec<u8>,
    debug_sink: Option<Box<dyn DebugSink>>,
}

impl Session {
    #[instrument(skip(target, options))]
    pub fn connect(target: &Target, options: &mut dyn OptionsCallback) -> MapiResult<(Session, Vec<String>)> {
        Session::connect_with_debug_sink(target, options, None)
    }

    /// Same as `connect`, but `debug_sink`, when given, observes the
    /// handshake traffic too, not just the queries sent afterward. The sink
    /// is retained on the returned `Session` the same way `set_debug_sink`
    /// would install it post-connect.
    #[instrument(skip(target, options, debug_sink))]
    pub fn connect_with_debug_sink(
        target: &Target,
        options: &mut dyn OptionsCallback,
        debug_sink: Option<Box<dyn DebugSink>>,
    ) -> MapiResult<(Session, Vec<String>)> {
        let mut debug_sink = debug_sink;
        let Established {
            reader,
            warnings,
            server_kind,
        } = handshake::connect(target, options, debug_sink.as_deref_mut())?;

        let language = if target.language == "mal" {
            Language::Mal
        } else {
            Language::Sql
        };

        Ok((
            Session {
                reader,
                language,
                server_kind,
                scratch: Vec::new(),
                debug_sink,
            },
            warnings,
        ))
    }

    /// Convenience entry point for callers with no in-handshake options.
    pub fn connect_default(target: &Target) -> MapiResult<(Session, Vec<String>)> {
        Session::connect(target, &mut NoOptions)
    }

    pub fn set_debug_sink(&mut self, sink: Option<Box<dyn DebugSink>>) {
        self.debug_sink = sink;
    }

    pub fn server_kind(&self) -> &str {
        &self.server_kind
    }

    #[instrument(skip(self))]
    pub fn query(&mut self, body: impl Into<String>) -> MapiResult<QueryResponse> {
        let command = QueryCommand::new(self.language, body.into());
        self.send_and_collect(&command.to_wire())
    }

    pub fn control(&mut self, command: ControlCommand) -> MapiResult<QueryResponse> {
        self.send_and_collect(&command.to_wire())
    }

    fn send_and_collect(&mut self, wire: &str) -> MapiResult<QueryResponse> {
        if let Some(sink) = self.debug_sink.as_deref_mut() {
            sink.on_line(DebugTag::Td, wire.as_bytes(), 0);
        }
        self.reader.framer_mut().write_with_sink(wire.as_bytes(), self.debug_sink.as_deref_mut())?;
        self.reader.framer_mut().flush()?;
        self.reader.reset_kind();

        let mut items = Vec::new();
        let mut warnings = Vec::new();
        let mut errors = Vec::new();
        let mut current_header: Option<ResultHeader> = None;
        let mut current_rows: Vec<Row> = Vec::new();

        loop {
            self.reader.advance_with_sink(self.debug_sink.as_deref_mut())?;
            match self.reader.kind() {
                LineType::Prompt => break,
                LineType::Error => {
                    errors.push(String::from_utf8_lossy(self.reader.line()).into_owned());
                }
                LineType::Info => {
                    warnings.push(String::from_utf8_lossy(self.reader.line()).into_owned());
                }
                LineType::Redirect => {
                    // Mid-session redirects are not expected outside the
                    // handshake; surfaced as a warning rather than failing
                    // an otherwise successful response.
                    warnings.push(format!(
                        "unexpected redirect during query: {}",
                        String::from_utf8_lossy(self.reader.line())
                    ));
                }
                LineType::SoHeader => {
                    if let Some(header) = current_header.take() {
                        items.push(ResponseItem::Table {
                            header,
                            rows: std::mem::take(&mut current_rows),
                        });
                    }
                    let (kind, fields) = crate::result::parse_soheader(self.reader.line())?;
                    match kind {
                        SoHeaderKind::Table => current_header = Some(ResultHeader::default()),
                        SoHeaderKind::UpdateCount => {
                            let count = fields.first().and_then(|s| s.parse::<i64>().ok()).unwrap_or(0);
                            items.push(ResponseItem::UpdateCount(count));
                        }
                        SoHeaderKind::SchemaChange => items.push(ResponseItem::SchemaChange),
                        SoHeaderKind::AutoCommitToggle => {
                            let on = fields.first().map(|s| s == "1").unwrap_or(false);
                            items.push(ResponseItem::AutoCommitToggle(on));
                        }
                        SoHeaderKind::Prepare => {
                            items.push(ResponseItem::Prepare(fields.join(" ")));
                        }
                        SoHeaderKind::DataBlock => {}
                    }
                }
                LineType::Header => {
                    if let Some(header) = current_header.as_mut() {
                        header.apply_line(self.reader.line())?;
                    }
                }
                LineType::Result => {
                    if let Some(header) = current_header.as_ref() {
                        let row = tuple::parse_line(self.reader.line(), &header.types, &mut self.scratch)?;
                        current_rows.push(row);
                    }
                }
                LineType::FileTransfer | LineType::More | LineType::Unknown => {}
            }
        }

        if let Some(header) = current_header.take() {
            items.push(ResponseItem::Table {
                header,
                rows: current_rows,
            });
        }

        if !errors.is_empty() {
            let (sqlstate, message) = split_sqlstate(&errors.join("\n"));
            return Err(MapiError::server(sqlstate, message));
        }

        Ok(QueryResponse { items, warnings })
    }

    /// Opens an upload stream after the server has signaled a file-transfer
    /// request (`{0x01,0x03}<action>`). Consumes the session's reader for
    /// the duration of the transfer.
    pub fn open_upload(self) -> UploadStream<crate::framer::Transport> {
        UploadStream::new(self.reader)
    }

    /// Opens a download stream the same way; `crlf` enables the optional
    /// line-ending conversion.
    pub fn open_download(self, crlf: bool) -> DownloadStream<crate::framer::Transport> {
        DownloadStream::new(self.reader.into_framer(), crlf)
    }

    pub fn close(mut self) -> MapiResult<()> {
        self.reader.close()
    }
}

/// Splits a rewritten ERROR line body (`!SQLSTATE!message`) into its two
/// parts; every line reaching here has already passed through the
/// SQLSTATE rewrite in `Line::from_raw`.
fn split_sqlstate(joined: &str) -> (String, String) {
    let first_line = joined.lines().next().unwrap_or(joined);
    let body = first_line.strip_prefix('!').unwrap_or(first_line);
    match body.split_once('!') {
        Some((sqlstate, rest)) => (sqlstate.to_string(), format!("{}{}", rest, &joined[first_line.len()..])),
        None => ("22000".to_string(), joined.to_string()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn split_sqlstate_extracts_code_and_message() {
        let (code, message) = split_sqlstate("!08M01!connection refused");
        assert_eq!(code, "08M01");
        assert_eq!(message, "connection refused");
    }

    #[test]
    fn split_sqlstate_falls_back_when_tag_missing() {
        let (code, message) = split_sqlstate("plain error text");
        assert_eq!(code, "22000");
        assert_eq!(message, "plain error text");
    }
}
