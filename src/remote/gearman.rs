use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::codec::{Decoder, Encoder, Framed};

use crate::common::error::{FleetError, Result};
use crate::common::job::JobQueueTask;
use crate::common::utils::{jittered_delay, with_timeout};
use crate::traits::job_queue::JobQueue;

const REQ_MAGIC: &[u8; 4] = b"\0REQ";
const RES_MAGIC: &[u8; 4] = b"\0RES";
const HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    SubmitJob = 7,
    JobCreated = 8,
    WorkStatus = 12,
    WorkComplete = 13,
    WorkFail = 14,
    EchoReq = 16,
    EchoRes = 17,
    Error = 19,
    WorkException = 25,
    WorkData = 28,
    WorkWarning = 29,
}

impl PacketType {
    fn from_code(code: u32) -> Option<Self> {
        let kind = match code {
            7 => PacketType::SubmitJob,
            8 => PacketType::JobCreated,
            12 => PacketType::WorkStatus,
            13 => PacketType::WorkComplete,
            14 => PacketType::WorkFail,
            16 => PacketType::EchoReq,
            17 => PacketType::EchoRes,
            19 => PacketType::Error,
            25 => PacketType::WorkException,
            28 => PacketType::WorkData,
            29 => PacketType::WorkWarning,
            _ => return None,
        };
        Some(kind)
    }

    /// Arguments carried by the packet; the last one may contain NULs.
    fn arg_count(self) -> usize {
        match self {
            PacketType::SubmitJob | PacketType::WorkStatus => 3,
            PacketType::WorkComplete
            | PacketType::WorkException
            | PacketType::WorkData
            | PacketType::WorkWarning
            | PacketType::Error => 2,
            PacketType::JobCreated
            | PacketType::WorkFail
            | PacketType::EchoReq
            | PacketType::EchoRes => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketType,
    pub args: Vec<Bytes>,
}

impl Packet {
    pub fn new(kind: PacketType, args: &[&[u8]]) -> Self {
        Self {
            kind,
            args: args.iter().map(|a| Bytes::copy_from_slice(a)).collect(),
        }
    }

    fn arg_str(&self, index: usize) -> String {
        self.args
            .get(index)
            .map(|a| String::from_utf8_lossy(a).into_owned())
            .unwrap_or_default()
    }
}

/// Binary framing: magic, big-endian type and size, NUL-separated args.
/// Requests are encoded, responses decoded.
#[derive(Debug, Default)]
pub struct GearmanCodec;

impl Encoder<Packet> for GearmanCodec {
    type Error = io::Error;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> io::Result<()> {
        let size = packet.args.iter().map(Bytes::len).sum::<usize>()
            + packet.args.len().saturating_sub(1);
        dst.reserve(HEADER_LEN + size);
        dst.put_slice(REQ_MAGIC);
        dst.put_u32(packet.kind as u32);
        dst.put_u32(size as u32);
        for (i, arg) in packet.args.iter().enumerate() {
            if i > 0 {
                dst.put_u8(0);
            }
            dst.put_slice(arg);
        }
        Ok(())
    }
}

impl Decoder for GearmanCodec {
    type Item = Packet;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Packet>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        if &src[..4] != RES_MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad response magic"));
        }
        let code = u32::from_be_bytes([src[4], src[5], src[6], src[7]]);
        let size = u32::from_be_bytes([src[8], src[9], src[10], src[11]]) as usize;
        if src.len() < HEADER_LEN + size {
            src.reserve(HEADER_LEN + size - src.len());
            return Ok(None);
        }
        src.advance(HEADER_LEN);
        let data = src.split_to(size).freeze();
        let kind = PacketType::from_code(code).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, format!("unknown packet type {}", code))
        })?;
        Ok(Some(Packet {
            kind,
            args: split_args(data, kind.arg_count()),
        }))
    }
}

fn split_args(mut data: Bytes, count: usize) -> Vec<Bytes> {
    let mut args = Vec::with_capacity(count);
    while args.len() + 1 < count {
        match data.iter().position(|b| *b == 0) {
            Some(pos) => {
                args.push(data.split_to(pos));
                data.advance(1);
            }
            None => break,
        }
    }
    args.push(data);
    args
}

type GearmanConnection = Framed<TcpStream, GearmanCodec>;

/// Client for a single Gearman server.
pub struct GearmanQueue {
    host: String,
    port: u16,
    timeout: Duration,
    completion_timeout: Duration,
    conn: Mutex<Option<GearmanConnection>>,
}

impl GearmanQueue {
    pub fn new(host: &str, port: u16, timeout: Duration, completion_timeout: Duration) -> Self {
        log::info!("Adding queue server {}:{}", host, port);
        Self {
            host: host.to_string(),
            port,
            timeout,
            completion_timeout,
            conn: Mutex::new(None),
        }
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn connect(&self) -> Result<GearmanConnection> {
        let stream = with_timeout(self.timeout, "queue connect", async {
            Ok::<_, FleetError>(TcpStream::connect(self.address()).await?)
        })
        .await
        .map_err(unreachable)?;
        Ok(Framed::new(stream, GearmanCodec))
    }

    async fn next_packet(&self, framed: &mut GearmanConnection) -> Result<Packet> {
        match tokio::time::timeout(self.timeout, framed.next()).await {
            Ok(Some(Ok(packet))) => Ok(packet),
            Ok(Some(Err(e))) => Err(unreachable(e.into())),
            Ok(None) => Err(FleetError::Unreachable(format!("{} closed the connection", self.address()))),
            Err(_) => Err(FleetError::Unreachable(format!(
                "no reply from {} within {:?}",
                self.address(),
                self.timeout
            ))),
        }
    }

    async fn echo(&self, framed: &mut GearmanConnection) -> Result<()> {
        framed
            .send(Packet::new(PacketType::EchoReq, &[b"ping".as_slice()]))
            .await
            .map_err(|e| unreachable(e.into()))?;
        let reply = self.next_packet(framed).await?;
        if reply.kind != PacketType::EchoRes {
            return Err(FleetError::Unreachable(format!("unexpected {:?} to echo", reply.kind)));
        }
        Ok(())
    }

    /// Sends the job and waits for the queue to acknowledge it.
    async fn submit(&self, framed: &mut GearmanConnection, task: &JobQueueTask) -> Result<String> {
        let payload = task.payload()?;
        framed
            .send(Packet::new(
                PacketType::SubmitJob,
                &[task.name.as_bytes(), task.unique_id.as_bytes(), payload.as_bytes()],
            ))
            .await
            .map_err(|e| unreachable(e.into()))?;

        let created = self.next_packet(framed).await?;
        match created.kind {
            PacketType::JobCreated => Ok(created.arg_str(0)),
            PacketType::Error => Err(FleetError::Unreachable(format!(
                "queue rejected {}: {}",
                task.name,
                created.arg_str(1)
            ))),
            other => Err(FleetError::Unreachable(format!(
                "unexpected {:?} while submitting {}",
                other, task.name
            ))),
        }
    }

    /// Status and data packets do not extend the wait past `completion_timeout`.
    async fn await_completion(&self, framed: &mut GearmanConnection, task: &JobQueueTask, handle: &str) -> Result<()> {
        let deadline = Instant::now() + self.completion_timeout;
        let wait = async {
            loop {
                let packet = self.next_packet(framed).await?;
                if packet.arg_str(0) != handle {
                    continue;
                }
                match packet.kind {
                    PacketType::WorkComplete => return Ok::<_, FleetError>(()),
                    PacketType::WorkFail | PacketType::WorkException => {
                        return Err(FleetError::Unreachable(format!("job {} failed on worker", task.name)));
                    }
                    _ => {}
                }
            }
        };
        match timeout_at(deadline, wait).await {
            Ok(outcome) => outcome,
            Err(_) => Err(FleetError::Unreachable(format!(
                "job {} did not complete within {:?}",
                task.name, self.completion_timeout
            ))),
        }
    }

    async fn submit_on(&self, conn: &mut Option<GearmanConnection>, task: &JobQueueTask) -> Result<String> {
        if conn.is_none() {
            *conn = Some(self.connect().await?);
        }
        let Some(framed) = conn.as_mut() else {
            return Err(FleetError::Unreachable(format!("no connection to {}", self.address())));
        };
        let outcome = self.submit(framed, task).await;
        if outcome.is_err() {
            // Stream position is unknown after a failure; reconnect next time.
            *conn = None;
        }
        outcome
    }
}

fn unreachable(e: FleetError) -> FleetError {
    match e {
        FleetError::Io(io) => FleetError::Unreachable(format!("queue: {}", io)),
        other => other,
    }
}

#[async_trait]
impl JobQueue for GearmanQueue {
    fn host(&self) -> &str {
        &self.host
    }

    async fn wait_for_server(&self) -> Result<()> {
        let mut guard = self.conn.lock().await;
        if let Some(framed) = guard.as_mut() {
            match self.echo(framed).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    log::warn!("Dropping stale connection to {}: {}", self.address(), e);
                    *guard = None;
                }
            }
        }
        let deadline = Instant::now() + self.timeout;
        loop {
            let attempt = async {
                let mut framed = self.connect().await?;
                self.echo(&mut framed).await?;
                Ok::<_, FleetError>(framed)
            };
            match attempt.await {
                Ok(framed) => {
                    *guard = Some(framed);
                    log::debug!("Queue server {} is up", self.address());
                    return Ok(());
                }
                Err(e) if Instant::now() >= deadline => {
                    log::error!("Queue server {} unavailable: {}", self.address(), e);
                    return Err(e);
                }
                Err(e) => {
                    log::debug!("Waiting for queue server {}: {}", self.address(), e);
                    sleep(Duration::from_millis(jittered_delay(200))).await;
                }
            }
        }
    }

    async fn submit_job(&self, task: &JobQueueTask, wait_for_completion: bool) -> Result<String> {
        let mut guard = self.conn.lock().await;
        let reused = guard.is_some();
        let handle = match self.submit_on(&mut guard, task).await {
            // The queue never acknowledged the job, so one resubmission is safe.
            Err(e) if reused => {
                log::warn!("Connection to {} went stale ({}), resubmitting {}", self.address(), e, task.name);
                self.submit_on(&mut guard, task).await?
            }
            outcome => outcome?,
        };
        log::debug!("Job {} accepted as {}", task.name, handle);
        if !wait_for_completion {
            return Ok(handle);
        }

        let Some(framed) = guard.as_mut() else {
            return Err(FleetError::Unreachable(format!("no connection to {}", self.address())));
        };
        let outcome = self.await_completion(framed, task, &handle).await;
        if outcome.is_err() {
            *guard = None;
        }
        outcome.map(|()| handle)
    }

    async fn workers(&self) -> Result<Vec<String>> {
        with_timeout(self.timeout, "queue workers request", async {
            let mut stream = TcpStream::connect(self.address()).await?;
            stream.write_all(b"workers\n").await?;
            let mut lines = BufReader::new(stream).lines();
            let mut out = Vec::new();
            while let Some(line) = lines.next_line().await? {
                if line.trim() == "." {
                    break;
                }
                out.push(line);
            }
            Ok::<_, FleetError>(out)
        })
        .await
        .map_err(unreachable)
    }
}
