#![allow(dead_code)] // Shared across test binaries; each uses a subset.

use std::io::{self, Read, Write};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;

use core_proto::Codec;
use core_runtime::{Agent, AgentConfig, Store};

/// Blocking reader fed from a channel; dropping the sender is EOF. This is
/// how tests keep the agent's stdin open across await points.
pub struct ChanReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    pos: usize,
}

impl ChanReader {
    pub fn new(rx: Receiver<Vec<u8>>) -> ChanReader {
        ChanReader {
            rx,
            pending: Vec::new(),
            pos: 0,
        }
    }
}

impl Read for ChanReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.pending.len() {
            match self.rx.recv() {
                Ok(bytes) => {
                    self.pending = bytes;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Write sink the test can inspect while the agent owns the writer.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().expect("shared buf lock").clone()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .expect("shared buf lock")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A running agent wired to scripted stdio.
pub struct Harness {
    pub input: Sender<Vec<u8>>,
    pub stdout: SharedBuf,
    pub stderr: SharedBuf,
    pub task: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl Harness {
    /// Spawn an agent on the current runtime; `configure` registers test
    /// reducers before the loop starts.
    pub fn spawn(configure: impl FnOnce(&mut Store)) -> Harness {
        let (input, rx) = std::sync::mpsc::channel::<Vec<u8>>();
        let stdout = SharedBuf::default();
        let stderr = SharedBuf::default();
        let mut agent = Agent::new(AgentConfig {
            codec: Codec::Json,
            stdin: Some(Box::new(ChanReader::new(rx))),
            stdout: Some(Box::new(stdout.clone())),
            stderr: Some(Box::new(stderr.clone())),
        });
        configure(agent.store_mut());
        let task = tokio::spawn(agent.run());
        Harness {
            input,
            stdout,
            stderr,
            task,
        }
    }

    /// Send one request envelope.
    pub fn send(&self, envelope: Value) {
        let bytes = serde_json::to_vec(&envelope).expect("envelope serializes");
        self.input.send(bytes).expect("agent stdin open");
    }

    /// Everything the agent has emitted so far, split into envelopes. A
    /// trailing partial write is ignored until complete.
    pub fn responses(&self) -> Vec<Value> {
        parse_stream(&self.stdout.contents())
    }

    /// Poll the output until `pred` produces a value.
    pub async fn wait_for<T>(&self, what: &str, mut pred: impl FnMut(&[Value]) -> Option<T>) -> T {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let responses = self.responses();
            if let Some(found) = pred(&responses) {
                return found;
            }
            assert!(
                Instant::now() < deadline,
                "timed out waiting for {what}; saw {responses:#?}"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Response carrying the given cookie.
    pub async fn response_for(&self, cookie: &str) -> Value {
        let cookie = cookie.to_string();
        self.wait_for(&format!("response with cookie {cookie}"), move |rs| {
            rs.iter().find(|r| r["Cookie"] == cookie.as_str()).cloned()
        })
        .await
    }

    /// Close stdin and wait for the loop to exit.
    pub async fn finish(self) -> anyhow::Result<()> {
        drop(self.input);
        self.task.await.expect("agent task joins")
    }
}

pub fn parse_stream(bytes: &[u8]) -> Vec<Value> {
    let mut values = Vec::new();
    for item in serde_json::Deserializer::from_slice(bytes).into_iter::<Value>() {
        match item {
            Ok(v) => values.push(v),
            Err(_) => break,
        }
    }
    values
}

/// Client actions of the given name across all pushed states, in order.
pub fn client_actions<'a>(responses: &'a [Value], name: &str) -> Vec<&'a Value> {
    responses
        .iter()
        .filter_map(|r| r["State"]["ClientActions"].as_array())
        .flatten()
        .filter(|a| a["Name"] == name)
        .collect()
}
