// winwing-probe/src/main.rs
// Talks to attached Winwing hardware without X-Plane: lists devices,
// previews PAP3 LCD payloads from JSON state fixtures and prints decoded
// input from a live device.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hidapi::{DeviceInfo, HidApi};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use winwing_protocol::input::{ButtonField, InputDecoder, InputEvent};
use winwing_protocol::{pap3, pap3_lcd, DeviceFamily, WINWING_VENDOR_ID};
use winwing_state::{LcdDisplayConfig, Pap3State};

// ---------------------------------------------------------------------------
// CLI args
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "winwing-probe", about = "Inspect Winwing HID hardware")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every attached Winwing HID device
    List,
    /// Compose the PAP3 LCD payload for a JSON `Pap3State` and print it
    LcdPreview {
        #[arg(long)] state: PathBuf,
        /// Draw the SPD/HDG/V/S labels
        #[arg(long)] labels: bool,
        /// Dash out hidden windows
        #[arg(long)] dashes: bool,
    },
    /// Print decoded input from a device until interrupted
    Monitor {
        /// Product id in hex, e.g. bf0f; defaults to the first supported device
        #[arg(long, value_parser = parse_pid)] pid: Option<u16>,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match Args::parse().command {
        Command::List => list(),
        Command::LcdPreview { state, labels, dashes } => {
            let cfg = LcdDisplayConfig {
                show_labels: labels,
                show_labels_when_inactive: labels,
                show_dashes_when_inactive: dashes,
            };
            println!("{}", lcd_preview(&state, &cfg)?);
            Ok(())
        }
        Command::Monitor { pid } => monitor(pid),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_pid(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("bad product id {s:?}: {e}"))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" ")
}

fn family_label(pid: u16) -> String {
    DeviceFamily::from_product_id(pid).map_or_else(|| "unsupported".to_string(), |f| f.name())
}

fn winwing_devices(api: &HidApi) -> impl Iterator<Item = &DeviceInfo> {
    api.device_list().filter(|d| d.vendor_id() == WINWING_VENDOR_ID)
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

fn list() -> Result<()> {
    let api = HidApi::new().context("Failed to initialise HID")?;
    let mut count = 0;
    for d in winwing_devices(&api) {
        count += 1;
        println!(
            "{:04x}  {:<22} {:<28} {}",
            d.product_id(),
            family_label(d.product_id()),
            d.product_string().unwrap_or("?"),
            d.path().to_string_lossy(),
        );
    }
    info!(count, "Winwing devices found");
    Ok(())
}

// ---------------------------------------------------------------------------
// lcd-preview
// ---------------------------------------------------------------------------

fn lcd_preview(path: &Path, cfg: &LcdDisplayConfig) -> Result<String> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let state: Pap3State = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    let payload = pap3_lcd::render_state(&state, cfg);
    debug!(len = payload.len(), "payload composed");
    Ok(format!("{}\n{}", hex(&payload), pap3_lcd::describe(&payload)))
}

// ---------------------------------------------------------------------------
// monitor
// ---------------------------------------------------------------------------

/// Decoder matching the device's report shape.
enum Decoder {
    Pap3(InputDecoder),
    Buttons { family: DeviceFamily, field: ButtonField, pressed: Vec<bool> },
}

impl Decoder {
    fn for_family(family: DeviceFamily) -> Self {
        match family {
            DeviceFamily::Pap3 => Self::Pap3(InputDecoder::new(pap3::input_layout())),
            family => Self::Buttons { family, field: ButtonField::new(), pressed: Vec::new() },
        }
    }

    /// One line per decoded change.
    fn lines(&mut self, report: &[u8]) -> Vec<String> {
        match self {
            Self::Pap3(dec) => dec
                .decode(report)
                .into_iter()
                .map(|ev| match ev {
                    InputEvent::Button { offset, mask, pressed } => {
                        format!("button {offset:#04x}/{mask:#04x} {}", if pressed { "down" } else { "up" })
                    }
                    InputEvent::Encoder { offset, delta } => format!("encoder {offset:#04x} {delta:+}"),
                    InputEvent::LightSensor(v) => format!("light {v}"),
                })
                .collect(),
            Self::Buttons { family, field, pressed } => {
                let Some(states) = field.decode(report) else { return Vec::new() };
                let mut lines = Vec::new();
                for (id, now) in states {
                    let index = usize::from(id);
                    if pressed.len() <= index {
                        pressed.resize(index + 1, false);
                    }
                    if std::mem::replace(&mut pressed[index], now) == now {
                        continue;
                    }
                    let key = match family {
                        DeviceFamily::Cdu(hw, _) => {
                            hw.key_for_index(index).map(|k| format!(" {k:?}")).unwrap_or_default()
                        }
                        _ => String::new(),
                    };
                    lines.push(format!("button {id}{key} {}", if now { "down" } else { "up" }));
                }
                lines
            }
        }
    }
}

fn monitor(pid: Option<u16>) -> Result<()> {
    let api = HidApi::new().context("Failed to initialise HID")?;
    let Some(info) = winwing_devices(&api).find(|d| match pid {
        Some(p) => d.product_id() == p,
        None => DeviceFamily::from_product_id(d.product_id()).is_some(),
    }) else {
        bail!("no matching Winwing device attached");
    };
    let Some(family) = DeviceFamily::from_product_id(info.product_id()) else {
        bail!("product {:04x} is not supported", info.product_id());
    };
    let device = api
        .open_path(info.path())
        .with_context(|| format!("Failed to open {}", info.path().to_string_lossy()))?;
    info!(device = %family.name(), "monitoring, Ctrl-C to stop");

    let mut decoder = Decoder::for_family(family);
    let mut buf = [0u8; 65];
    loop {
        let n = device.read_timeout(&mut buf, 100).context("HID read failed")?;
        if n == 0 {
            continue;
        }
        for line in decoder.lines(&buf[..n]) {
            println!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winwing_protocol::cdu::{CduHardware, CduVariant};

    #[test]
    fn pid_accepts_bare_and_prefixed_hex() {
        assert_eq!(parse_pid("bf0f"), Ok(0xBF0F));
        assert_eq!(parse_pid("0xBB36"), Ok(0xBB36));
        assert!(parse_pid("zz").is_err());
    }

    #[test]
    fn preview_reads_a_state_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"hdg": 90, "spd": 250.0}"#).unwrap();
        let out = lcd_preview(&path, &LcdDisplayConfig::default()).unwrap();
        let mut lines = out.lines();
        assert_eq!(lines.next().map(|l| l.split(' ').count()), Some(32), "32 payload bytes");
        assert!(lines.next().is_some_and(|l| l.contains("HDG 090")));

        std::fs::write(&path, "{ nope").unwrap();
        let err = lcd_preview(&path, &LcdDisplayConfig::default()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn cdu_edges_name_their_keys() {
        let family = DeviceFamily::Cdu(CduHardware::Mcdu, CduVariant::Captain);
        let mut d = Decoder::for_family(family);
        let mut report = vec![0u8; 13];
        report[0] = 1;
        assert!(d.lines(&report).is_empty(), "baseline");

        report[1] = 0b0000_0001;
        let lines = d.lines(&report);
        let key = CduHardware::Mcdu.key_for_index(0).map(|k| format!("{k:?}")).unwrap_or_default();
        assert_eq!(lines, vec![format!("button 0 {key} down")]);
        assert_eq!(family_label(0x1234), "unsupported");
    }
}
