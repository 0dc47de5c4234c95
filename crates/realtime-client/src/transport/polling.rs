use reqwest::header::CONTENT_TYPE;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

use super::websocket::redact;
use crate::RealtimeError;
use crate::protocol::{EnginePacket, Handshake, decode_payload};

const INBOUND_CAPACITY: usize = 64;

/// Engine.IO over HTTP long-polling.
///
/// A background task keeps one GET outstanding and feeds decoded packets
/// into a channel, so `recv` stays cancel-safe inside `select!`.
pub struct PollingTransport {
    http: reqwest::Client,
    url: Url,
    inbound: mpsc::Receiver<Result<EnginePacket, RealtimeError>>,
    reader: JoinHandle<()>,
}

impl PollingTransport {
    /// Run the polling handshake and start the poll loop.
    pub async fn open(http: reqwest::Client, url: Url) -> Result<(Self, Handshake), RealtimeError> {
        tracing::debug!(url = %redact(&url), "Opening polling transport");
        let body = get_payload(&http, &url).await?;
        let mut packets = decode_payload(&body)?.into_iter();
        let Some(EnginePacket::Open(handshake)) = packets.next() else {
            return Err(RealtimeError::Protocol(
                "polling handshake did not start with an open packet".into(),
            ));
        };

        let mut session_url = url;
        session_url.query_pairs_mut().append_pair("sid", &handshake.sid);

        // Room for the whole handshake batch plus a poll error.
        let (tx, inbound) = mpsc::channel(INBOUND_CAPACITY.max(packets.len() + 1));
        for packet in packets {
            tx.try_send(Ok(packet)).map_err(|_| {
                RealtimeError::Protocol("polling handshake batch overflowed the inbound queue".into())
            })?;
        }
        let reader = tokio::spawn(poll_loop(http.clone(), session_url.clone(), tx));

        Ok((
            Self {
                http,
                url: session_url,
                inbound,
                reader,
            },
            handshake,
        ))
    }

    pub async fn send(&mut self, packet: &EnginePacket) -> Result<(), RealtimeError> {
        let body = packet.encode();
        tracing::trace!(packet = %body, "poll send");
        let resp = self
            .http
            .post(self.url.clone())
            .header(CONTENT_TYPE, "text/plain;charset=UTF-8")
            .body(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(RealtimeError::Status {
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }

    pub async fn recv(&mut self) -> Result<Option<EnginePacket>, RealtimeError> {
        match self.inbound.recv().await {
            Some(Ok(packet)) => Ok(Some(packet)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// Stop polling and hand back packets received but not yet consumed.
    pub(super) fn pause(&mut self) -> Vec<EnginePacket> {
        self.reader.abort();
        let mut pending = Vec::new();
        while let Ok(item) = self.inbound.try_recv() {
            match item {
                Ok(EnginePacket::Noop) => {}
                Ok(packet) => pending.push(packet),
                Err(e) => tracing::debug!(error = %e, "Dropping poll error during upgrade"),
            }
        }
        pending
    }

    pub async fn close(&mut self) {
        let _ = self.send(&EnginePacket::Close).await;
        self.reader.abort();
    }
}

impl Drop for PollingTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn poll_loop(
    http: reqwest::Client,
    url: Url,
    tx: mpsc::Sender<Result<EnginePacket, RealtimeError>>,
) {
    loop {
        let packets = match get_payload(&http, &url).await.and_then(|b| decode_payload(&b)) {
            Ok(packets) => packets,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        };
        for packet in packets {
            tracing::trace!(packet = %packet.encode(), "poll recv");
            let closing = packet == EnginePacket::Close;
            if tx.send(Ok(packet)).await.is_err() || closing {
                return;
            }
        }
    }
}

async fn get_payload(http: &reqwest::Client, url: &Url) -> Result<String, RealtimeError> {
    let resp = http.get(url.clone()).send().await?;
    if !resp.status().is_success() {
        return Err(RealtimeError::Status {
            status: resp.status().as_u16(),
        });
    }
    Ok(resp.text().await?)
}
