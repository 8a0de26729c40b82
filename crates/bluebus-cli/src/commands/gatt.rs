//! Read and write command implementations.

use std::path::PathBuf;

use anyhow::{Context, Result};
use bluebus_core::{Handle, Session};

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_value_json, format_value_text};
use crate::util::write_output;

pub async fn cmd_read(
    session: &Session,
    uuid: &str,
    format: OutputFormat,
    output: Option<&PathBuf>,
    opts: &FormatOptions,
) -> Result<()> {
    let characteristic = session
        .characteristic(uuid)
        .with_context(|| format!("No unique characteristic {}", uuid))?;
    let value = characteristic
        .read_value()
        .await
        .with_context(|| format!("Failed to read {}", characteristic.name()))?;

    let content = match format {
        OutputFormat::Json => format_value_json(
            characteristic.path().as_str(),
            characteristic.uuid(),
            &value,
            opts,
        )?,
        OutputFormat::Text => format_value_text(&value),
    };
    write_output(output, &content)
}

pub async fn cmd_write(session: &Session, uuid: &str, value: &[u8]) -> Result<()> {
    let characteristic = session
        .characteristic(uuid)
        .with_context(|| format!("No unique characteristic {}", uuid))?;
    characteristic
        .write_value(value)
        .await
        .with_context(|| format!("Failed to write {}", characteristic.name()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bluebus_core::{MockBus, SessionConfig, Value};

    use super::*;

    const CHAR: &str = "/org/bluez/hci0/dev_C4_7C_8D_6A_2F_10/service000c/char000d";

    async fn session() -> (Arc<MockBus>, Session) {
        let bus = Arc::new(MockBus::new());
        bus.add_characteristic(
            CHAR,
            "/org/bluez/hci0/dev_C4_7C_8D_6A_2F_10/service000c",
            "00002a19-0000-1000-8000-00805f9b34fb",
            &["read", "write"],
        );
        let session = Session::with_bus(bus.clone(), SessionConfig::default())
            .await
            .unwrap();
        (bus, session)
    }

    #[tokio::test]
    async fn test_read_writes_hex_to_output() {
        let (bus, session) = session().await;
        bus.set_reply("ReadValue", vec![Value::from(vec![0x2a_u8, 0x01])]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("value.txt");

        cmd_read(
            &session,
            "2a19",
            OutputFormat::Text,
            Some(&path),
            &FormatOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "2a01\n");
    }

    #[tokio::test]
    async fn test_write_sends_bytes() {
        let (bus, session) = session().await;
        cmd_write(&session, "2a19", &[1, 2]).await.unwrap();
        let call = bus.last_call("WriteValue").unwrap();
        assert_eq!(call.path.as_str(), CHAR);
        assert_eq!(call.args[0], Value::from(vec![1u8, 2]));
    }

    #[tokio::test]
    async fn test_unknown_characteristic() {
        let (_bus, session) = session().await;
        let err = cmd_write(&session, "2a37", &[1]).await.unwrap_err();
        assert!(err.to_string().contains("No unique characteristic 2a37"));
    }

    #[tokio::test]
    async fn test_uppercase_uuid_is_rejected() {
        let (bus, session) = session().await;
        let err = cmd_write(&session, "2A19", &[1]).await.unwrap_err();
        assert!(format!("{:#}", err).contains("2A19"));
        assert_eq!(bus.call_count("WriteValue"), 0);
    }
}
