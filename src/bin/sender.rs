//! VFP 송신기 - Video Fragment Protocol
//!
//! 파일을 고정 크기 프레임으로 잘라 일정 간격으로 전송하는 데모
//! (실제 영상 프레임 획득은 이 프로그램의 범위 밖)
//!
//! 사용법:
//!   cargo run --release --bin vfp-sender -- [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin vfp-sender -- --peer 127.0.0.1:9000 --file video.bin
//!   cargo run --release --bin vfp-sender -- -p 127.0.0.1:9000 --frame-size 20000 --interval 33

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use vfp::{Config, FrameSender};

/// 송신기 설정
struct SenderArgs {
    bind_addr: SocketAddr,
    peer_addr: SocketAddr,
    file_path: Option<PathBuf>,
    connection_id: Option<u16>,
    frame_size: usize,
    interval_ms: u64,
    config: Config,
}

impl Default for SenderArgs {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            peer_addr: SocketAddr::from(([127, 0, 0, 1], 9000)),
            file_path: None,
            connection_id: None,
            frame_size: 16 * 1024,
            interval_ms: 33,
            config: Config::default(),
        }
    }
}

fn parse_args() -> Result<SenderArgs, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = SenderArgs::default();

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match args[i].as_str() {
            "--bind" | "-b" => {
                parsed.bind_addr = parse_value(value, "주소")?;
                i += 1;
            }
            "--peer" | "-p" => {
                parsed.peer_addr = parse_value(value, "주소")?;
                i += 1;
            }
            "--file" | "-f" => {
                parsed.file_path = Some(PathBuf::from(parse_value::<String>(value, "경로")?));
                i += 1;
            }
            "--connection-id" | "-c" => {
                parsed.connection_id = Some(parse_value(value, "숫자")?);
                i += 1;
            }
            "--frame-size" => {
                parsed.frame_size = parse_value(value, "숫자")?;
                i += 1;
            }
            "--interval" => {
                parsed.interval_ms = parse_value(value, "숫자")?;
                i += 1;
            }
            "--max-payload" => {
                parsed.config.max_payload_size = parse_value(value, "숫자")?;
                i += 1;
            }
            "--help" | "-h" => {
                println!(
                    r#"VFP Sender - Video Fragment Protocol 송신기

파일을 고정 크기 프레임으로 나눠 UDP 조각으로 전송

사용법:
  cargo run --release --bin vfp-sender -- [OPTIONS]

옵션:
  -b, --bind <ADDR>           바인드 주소 (기본: 0.0.0.0:0)
  -p, --peer <ADDR>           수신기 주소 (기본: 127.0.0.1:9000)
  -f, --file <PATH>           전송할 파일 (없으면 테스트 데이터)
  -c, --connection-id <ID>    연결 ID (기본: 랜덤)
  --frame-size <SIZE>         프레임 크기 바이트 (기본: 16384)
  --interval <MS>             프레임 간격 밀리초 (기본: 33)
  --max-payload <SIZE>        조각 페이로드 최대 크기 (기본: 1400)
  -h, --help                  이 도움말 출력
"#
                );
                std::process::exit(0);
            }
            other => return Err(format!("알 수 없는 옵션: {other}")),
        }
        i += 1;
    }

    validate(&parsed)?;
    Ok(parsed)
}

fn validate(args: &SenderArgs) -> Result<(), String> {
    if args.frame_size == 0 || args.config.max_payload_size == 0 {
        return Err("--frame-size와 --max-payload는 0보다 커야 함".into());
    }

    if args.interval_ms == 0 {
        return Err("--interval은 0보다 커야 함".into());
    }

    let fragments = args.config.fragments_for(args.frame_size);
    if fragments > u16::MAX as usize {
        return Err(format!(
            "프레임 하나가 {fragments}조각으로 나뉨 (최대 {}): --frame-size를 줄이거나 --max-payload를 늘릴 것",
            u16::MAX
        ));
    }

    Ok(())
}

fn parse_value<T: std::str::FromStr>(value: Option<&String>, what: &str) -> Result<T, String> {
    value
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| format!("유효한 {what} 필요"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = parse_args()?;
    let connection_id = args.connection_id.unwrap_or_else(rand::random);

    info!("VFP Sender starting...");
    info!("Peer address: {}", args.peer_addr);
    info!("Connection ID: {}", connection_id);
    info!("Frame size: {} bytes", args.frame_size);
    info!("Max payload: {} bytes", args.config.max_payload_size);

    // 전송할 데이터 준비
    let data = if let Some(path) = &args.file_path {
        info!("Loading file: {:?}", path);
        Bytes::from(std::fs::read(path)?)
    } else {
        info!("Using test data (1MB)");
        Bytes::from(vec![0xABu8; 1024 * 1024])
    };

    let sender = Arc::new(
        FrameSender::connect(args.config, connection_id, args.bind_addr, args.peer_addr).await?,
    );

    // ACK 수신 태스크
    let ack_sender = sender.clone();
    tokio::spawn(async move {
        while let Ok(ack) = ack_sender.recv_ack().await {
            if ack.fragment_no == 0 {
                info!("ACK: frame {} avg_delay {}us", ack.frame_no, ack.avg_delay);
            }
        }
    });

    let interval = Duration::from_millis(args.interval_ms);
    let time_to_next = u32::try_from(args.interval_ms).unwrap_or(u32::MAX);
    let mut ticker = tokio::time::interval(interval);

    let mut offset = 0;
    while offset < data.len() {
        ticker.tick().await;

        let end = (offset + args.frame_size).min(data.len());
        let frame_no = sender.send_frame(data.slice(offset..end), time_to_next).await?;

        if frame_no % 30 == 0 {
            info!(
                "Progress: frame {} ({:.1}%)",
                frame_no,
                end as f64 / data.len() as f64 * 100.0
            );
        }
        offset = end;
    }

    // 마지막 ACK 대기
    tokio::time::sleep(Duration::from_millis(500)).await;

    let stats = sender.stats();
    info!("Transfer complete!");
    info!("  Frames: {}", stats.frames_sent);
    info!("  Packets: {}", stats.packets_sent);
    info!("  ACKs: {}", stats.acks_received);
    info!("  Throughput: {:.2} MB/s", stats.throughput() / 1_000_000.0);

    Ok(())
}
