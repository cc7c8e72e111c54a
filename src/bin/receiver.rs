//! VFP 수신기 - Video Fragment Protocol
//!
//! 조각을 조립해 완성된 프레임을 파일에 기록하는 데모
//! (디코더 연결은 이 프로그램의 범위 밖)
//!
//! 사용법:
//!   cargo run --release --bin vfp-receiver -- [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin vfp-receiver -- --bind 0.0.0.0:9000 --output received.bin
//!   RUST_LOG=vfp=debug cargo run --release --bin vfp-receiver -- --partial

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vfp::{Config, FrameReceiver};

/// 수신기 설정
struct ReceiverArgs {
    bind_addr: SocketAddr,
    output_path: Option<PathBuf>,
    idle_timeout_secs: u64,
    config: Config,
}

impl Default for ReceiverArgs {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            output_path: None,
            idle_timeout_secs: 10,
            config: Config::default(),
        }
    }
}

fn parse_args() -> Result<ReceiverArgs, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = ReceiverArgs::default();

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match args[i].as_str() {
            "--bind" | "-b" => {
                parsed.bind_addr = parse_value(value, "주소")?;
                i += 1;
            }
            "--output" | "-o" => {
                parsed.output_path = Some(PathBuf::from(parse_value::<String>(value, "경로")?));
                i += 1;
            }
            "--idle-timeout" => {
                parsed.idle_timeout_secs = parse_value(value, "숫자")?;
                i += 1;
            }
            "--frame-timeout" => {
                parsed.config.frame_timeout_ms = parse_value(value, "숫자")?;
                i += 1;
            }
            "--max-payload" => {
                parsed.config.max_payload_size = parse_value(value, "숫자")?;
                i += 1;
            }
            "--max-frame-size" => {
                parsed.config.max_frame_size = parse_value(value, "숫자")?;
                i += 1;
            }
            "--low-latency" => {
                parsed.config = Config::low_latency();
            }
            "--lossy" => {
                parsed.config = Config::lossy_network();
            }
            "--partial" => {
                parsed.config.deliver_partial = true;
            }
            "--no-ack" => {
                parsed.config.ack_enabled = false;
            }
            "--help" | "-h" => {
                println!(
                    r#"VFP Receiver - Video Fragment Protocol 수신기

UDP 조각을 조립해 완성된 프레임을 도착 순서대로 기록

사용법:
  cargo run --release --bin vfp-receiver -- [OPTIONS]

옵션:
  -b, --bind <ADDR>         바인드 주소 (기본: 0.0.0.0:9000)
  -o, --output <PATH>       프레임을 기록할 파일
  --idle-timeout <SECS>     프레임이 안 오면 종료 (기본: 10)
  --frame-timeout <MS>      미완성 프레임 폐기 타임아웃 (기본: 1000)
  --max-payload <SIZE>      허용 조각 페이로드 최대 크기 (기본: 1400)
  --max-frame-size <SIZE>   수신 프레임 최대 크기 (기본: 8388608)
  --low-latency             저지연 프리셋
  --lossy                   손실 네트워크 프리셋
  --partial                 폐기 프레임의 prefix도 전달
  --no-ack                  ACK 전송 끔
  -h, --help                이 도움말 출력

로그 레벨은 RUST_LOG로 조정 (예: RUST_LOG=vfp=debug)
"#
                );
                std::process::exit(0);
            }
            other => return Err(format!("알 수 없는 옵션: {other}")),
        }
        i += 1;
    }

    Ok(parsed)
}

fn parse_value<T: std::str::FromStr>(value: Option<&String>, what: &str) -> Result<T, String> {
    value
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| format!("유효한 {what} 필요"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정 (RUST_LOG 없으면 info)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = parse_args()?;

    info!("VFP Receiver starting...");
    info!("Frame timeout: {}ms", args.config.frame_timeout_ms);
    info!("Max payload: {} bytes", args.config.max_payload_size);
    info!("Partial delivery: {}", args.config.deliver_partial);

    let (receiver, mut frames) = FrameReceiver::start(args.config, args.bind_addr).await?;

    let mut output = match &args.output_path {
        Some(path) => Some(File::create(path).await?),
        None => None,
    };

    let idle = Duration::from_secs(args.idle_timeout_secs);
    let mut complete = 0u64;
    let mut partial = 0u64;
    let mut bytes = 0u64;
    let mut connections = BTreeSet::new();

    loop {
        let frame = match tokio::time::timeout(idle, frames.recv()).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(_) => {
                info!("{}초 동안 프레임 없음, 종료", args.idle_timeout_secs);
                break;
            }
        };

        connections.insert(frame.connection_id);

        if frame.partial {
            partial += 1;
            warn!(
                "부분 프레임 {}: {} bytes (connection {})",
                frame.frame_no,
                frame.payload.len(),
                frame.connection_id
            );
            continue;
        }

        complete += 1;
        bytes += frame.payload.len() as u64;

        if let Some(file) = output.as_mut() {
            file.write_all(&frame.payload).await?;
        }

        if complete % 30 == 0 {
            info!("Received {} frames ({} bytes)", complete, bytes);
        }
    }

    if let Some(file) = output.as_mut() {
        file.flush().await?;
    }

    // 오래 조용했던 연결은 이미 정리되며 요약이 로그에 남음
    for id in &connections {
        if let Some(stats) = receiver.stats(*id).await {
            info!("Connection {}: {}", id, stats.summary());
        }
    }

    receiver.stop().await;

    info!("Receive complete!");
    info!("  Complete frames: {}", complete);
    info!("  Partial frames: {}", partial);
    info!("  Bytes: {}", bytes);

    Ok(())
}
