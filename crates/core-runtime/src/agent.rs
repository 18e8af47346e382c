//! The agent loop: the process boundary between the editor and the store.
//!
//! A dedicated thread blocks on stdin decoding envelopes into the store's
//! work queue; the async loop consumes the queue one item at a time, which
//! is what serialises every reduction. Responses go out in request order;
//! states committed by background dispatches go out as unsolicited pushes
//! with an empty cookie. stderr carries free-form logs, opened by the
//! literal `ready` handshake line.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;

use core_actions::Action;
use core_proto::{Codec, CodecError, Decoder, Response};

use crate::state::State;
use crate::store::{Store, StoreHandle, Work};
use crate::util::lock_unpoisoned;

/// Construction options; the handles default to the real stdio streams and
/// exist so tests can script the conversation.
#[derive(Default)]
pub struct AgentConfig {
    pub codec: Codec,
    pub stdin: Option<Box<dyn Read + Send>>,
    pub stdout: Option<Box<dyn Write + Send>>,
    pub stderr: Option<Box<dyn Write + Send>>,
}

pub struct Agent {
    store: Store,
    rx: tokio::sync::mpsc::UnboundedReceiver<Work>,
    codec: Codec,
    stdin: Option<Box<dyn Read + Send>>,
    out: Arc<Mutex<ResponseWriter>>,
    stderr: Box<dyn Write + Send>,
}

impl Agent {
    pub fn new(cfg: AgentConfig) -> Agent {
        let AgentConfig {
            codec,
            stdin,
            stdout,
            stderr,
        } = cfg;

        let (mut store, rx) = Store::new();
        store.install_default_reducers();

        let out = Arc::new(Mutex::new(ResponseWriter {
            codec,
            w: stdout.unwrap_or_else(|| Box::new(io::stdout())),
        }));
        let push_out = Arc::clone(&out);
        store.set_push(Box::new(move |st: &State| {
            if let Err(e) = lock_unpoisoned(&push_out).send("", String::new(), st) {
                tracing::error!(target: "agent.ipc", error = %e, "state push failed");
            }
        }));

        Agent {
            store,
            rx,
            codec,
            stdin,
            out,
            stderr: stderr.unwrap_or_else(|| Box::new(io::stderr())),
        }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// The store, for registering user reducers before [`Agent::run`].
    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    /// Serve the editor until EOF, a `Shutdown` request, or a fatal framing
    /// error. Every exit path runs the `Unmount` reduction.
    pub async fn run(mut self) -> anyhow::Result<()> {
        writeln!(self.stderr, "ready")?;
        self.stderr.flush()?;
        tracing::info!(target: "agent", codec = %self.codec, "serving");

        self.store.boot();
        self.store.dispatch_now(Action::Started);

        let stdin = self.stdin.take().unwrap_or_else(|| Box::new(io::stdin()));
        let dec = Decoder::new(self.codec, stdin);
        let handle = self.store.handle().clone();
        std::thread::Builder::new()
            .name("attache-ipc-decode".to_string())
            .spawn(move || decode_loop(dec, handle))?;

        let mut fatal: Option<anyhow::Error> = None;
        while let Some(work) = self.rx.recv().await {
            match work {
                Work::Request(rq) => {
                    let cookie = rq.cookie.clone();
                    let is_shutdown = rq.action.name == "Shutdown";
                    tracing::debug!(target: "agent.ipc", action = %rq.action.name, cookie = %cookie, "request");
                    let outcome = self.store.sync_request(*rq);
                    let sent =
                        lock_unpoisoned(&self.out).send(&cookie, outcome.error, &outcome.state);
                    if let Err(e) = sent {
                        tracing::error!(target: "agent.ipc", error = %e, "response write failed");
                        fatal = Some(e.into());
                        break;
                    }
                    if is_shutdown {
                        break;
                    }
                }
                Work::Dispatch(act) => {
                    tracing::debug!(target: "agent.ipc", action = %act.name(), "dispatch");
                    self.store.dispatch_now(act);
                }
                Work::Eof => break,
                Work::Fatal(msg) => {
                    tracing::error!(target: "agent.ipc", error = %msg, "decode failed");
                    fatal = Some(anyhow!("{msg}"));
                    break;
                }
            }
        }

        self.store.unmount();
        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn decode_loop(mut dec: Decoder, handle: StoreHandle) {
    loop {
        match dec.decode::<core_proto::Request>() {
            Ok(Some(rq)) => handle.send_work(Work::Request(Box::new(rq))),
            Ok(None) => {
                handle.send_work(Work::Eof);
                return;
            }
            Err(e) => {
                handle.send_work(Work::Fatal(format!("ipc.decode: {e}")));
                return;
            }
        }
    }
}

struct ResponseWriter {
    codec: Codec,
    w: Box<dyn Write + Send>,
}

impl ResponseWriter {
    fn send(&mut self, cookie: &str, error: String, st: &State) -> Result<(), CodecError> {
        // When the request produced nothing more specific, the accumulated
        // user-facing errors become the response error.
        let error = if error.is_empty() {
            st.errors.join("\n")
        } else {
            error
        };
        let resp = Response {
            cookie: cookie.to_string(),
            error,
            state: st.snapshot(),
        };
        self.codec.encode(&mut self.w, &resp)?;
        self.w.flush()?;
        Ok(())
    }
}
