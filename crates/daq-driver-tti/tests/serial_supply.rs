//! PL330PD driver over a line-oriented serial link.
//!
//! A task on the far end of a `tokio::io::duplex` pipe plays the supply:
//! it reads terminated commands and answers queries from a small state
//! table, the way the real unit does over RS-232.

use daq_core::capabilities::{Readable, Settable};
use daq_core::serial::SerialTransport;
use daq_core::DaqError;
use daq_driver_tti::{Pl330pdDriver, StatusByte};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc;

/// Fake supply: keeps the set voltage and reports every command it saw.
async fn run_supply(stream: DuplexStream, seen: mpsc::UnboundedSender<String>) {
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();
    let mut volts = 0.0_f64;
    let mut output_on = false;

    while let Ok(Some(line)) = lines.next_line().await {
        let _ = seen.send(line.clone());
        let reply = match line.as_str() {
            "*IDN?" => Some("THURLBY THANDAR, PL330PD, 0, 2.01".to_string()),
            "V1?" => Some(format!("V1 {:.2}", volts)),
            "V1O?" => Some(format!("{:.2}V", if output_on { volts } else { 0.0 })),
            "*STB?" => Some("16".to_string()),
            "OP1 1" => {
                output_on = true;
                None
            }
            "OP1 0" => {
                output_on = false;
                None
            }
            other => {
                if let Some(value) = other.strip_prefix("V1 ") {
                    volts = value.parse().unwrap_or(volts);
                }
                None
            }
        };
        if let Some(reply) = reply {
            if writer.write_all(format!("{}\r\n", reply).as_bytes()).await.is_err() {
                break;
            }
        }
    }
}

fn connect() -> (Pl330pdDriver, mpsc::UnboundedReceiver<String>) {
    let (host, device) = tokio::io::duplex(256);
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_supply(device, tx));
    let transport = SerialTransport::new(Box::new(host), "\n", Duration::from_millis(500));
    (Pl330pdDriver::new(Arc::new(transport)), rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
    let mut seen = Vec::new();
    while let Ok(line) = rx.try_recv() {
        seen.push(line);
    }
    seen
}

#[tokio::test]
async fn test_identify_and_set_voltage() {
    let (driver, mut rx) = connect();

    let identity = driver.initialize(true).await.unwrap();
    assert!(identity.contains("PL330PD"));

    driver.set_voltage(12.5).await.unwrap();
    assert_eq!(driver.voltage().await.unwrap(), 12.5);

    assert_eq!(drain(&mut rx), vec!["*RST", "*IDN?", "V1 12.5", "V1?"]);
}

#[tokio::test]
async fn test_output_switch_and_readback() {
    let (driver, _rx) = connect();

    driver.set_voltage(5.0).await.unwrap();
    assert_eq!(driver.read().await.unwrap(), 0.0);

    driver.set_value("output_enabled", serde_json::json!(true)).await.unwrap();
    assert_eq!(driver.read().await.unwrap(), 5.0);

    assert_eq!(driver.check_fault().await.unwrap(), StatusByte::RESPONSE_READY);
}

#[tokio::test]
async fn test_rejected_voltage_never_reaches_the_wire() {
    let (driver, mut rx) = connect();

    let err = driver.set_voltage(33.0).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DaqError>(),
        Some(DaqError::InvalidValue { .. })
    ));

    // a round trip proves the link is idle apart from this query
    driver.voltage().await.unwrap();
    assert_eq!(drain(&mut rx), vec!["V1?"]);
}
