//! 전송 계층 추상화
//!
//! 코어는 "연결된 소켓으로 보내기"와 "주소 지정해서 보내기" 두 가지만 사용

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

/// 데이터그램 송신자
pub trait Transport {
    /// 연결된 상대에게 데이터그램 하나 전송
    fn send_datagram(&self, datagram: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// 지정 주소로 데이터그램 하나 전송
    fn send_datagram_to(
        &self,
        datagram: &[u8],
        addr: SocketAddr,
    ) -> impl Future<Output = io::Result<()>> + Send;
}

impl Transport for UdpSocket {
    fn send_datagram(&self, datagram: &[u8]) -> impl Future<Output = io::Result<()>> + Send {
        async move {
            let sent = self.send(datagram).await?;
            check_full_send(sent, datagram.len())
        }
    }

    fn send_datagram_to(
        &self,
        datagram: &[u8],
        addr: SocketAddr,
    ) -> impl Future<Output = io::Result<()>> + Send {
        async move {
            let sent = self.send_to(datagram, addr).await?;
            check_full_send(sent, datagram.len())
        }
    }
}

fn check_full_send(sent: usize, expected: usize) -> io::Result<()> {
    if sent != expected {
        return Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("데이터그램 일부만 전송됨: {sent}/{expected} bytes"),
        ));
    }
    Ok(())
}

/// 보낸 데이터그램을 기록만 하는 전송 (테스트용)
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingTransport {
    pub(crate) sent: parking_lot::Mutex<Vec<(Option<SocketAddr>, bytes::Bytes)>>,
}

#[cfg(test)]
impl RecordingTransport {
    pub(crate) fn datagrams(&self) -> Vec<bytes::Bytes> {
        self.sent.lock().iter().map(|(_, d)| d.clone()).collect()
    }
}

#[cfg(test)]
impl Transport for RecordingTransport {
    fn send_datagram(&self, datagram: &[u8]) -> impl Future<Output = io::Result<()>> + Send {
        self.sent
            .lock()
            .push((None, bytes::Bytes::copy_from_slice(datagram)));
        std::future::ready(Ok(()))
    }

    fn send_datagram_to(
        &self,
        datagram: &[u8],
        addr: SocketAddr,
    ) -> impl Future<Output = io::Result<()>> + Send {
        self.sent
            .lock()
            .push((Some(addr), bytes::Bytes::copy_from_slice(datagram)));
        std::future::ready(Ok(()))
    }
}
