//! Shared helpers for mailgrab integration tests.

use std::path::Path;

use mailgrab::gmail::model::{Header, Message, MessagePart, PartBody};
use mailgrab::Config;

/// Builds a config whose every output path lives under `root`, so
/// tests never touch the working directory.
pub fn sandbox_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.logging.system_log = root.join("logs/system.log");
    config.logging.search_log = root.join("logs/search.log");
    config.downloads.output_directory = root.join("downloads");
    config.csv_record.filename = root.join("download_record.csv");
    config
}

/// A message with one inline attachment per (filename, base64-data)
/// pair, the shape the messages.get endpoint returns.
pub fn message_with_attachments(
    id: &str,
    from: &str,
    subject: &str,
    attachments: &[(&str, &str)],
) -> Message {
    let parts = attachments
        .iter()
        .map(|(filename, data)| MessagePart {
            filename: filename.to_string(),
            mime_type: "application/octet-stream".to_string(),
            headers: Vec::new(),
            body: Some(PartBody {
                attachment_id: None,
                data: Some(data.to_string()),
                size: 0,
            }),
            parts: Vec::new(),
        })
        .collect();

    Message {
        id: id.to_string(),
        internal_date: Some("1706745600000".to_string()),
        payload: Some(MessagePart {
            filename: String::new(),
            mime_type: "multipart/mixed".to_string(),
            headers: vec![
                Header {
                    name: "From".to_string(),
                    value: from.to_string(),
                },
                Header {
                    name: "Subject".to_string(),
                    value: subject.to_string(),
                },
            ],
            body: None,
            parts,
        }),
    }
}
