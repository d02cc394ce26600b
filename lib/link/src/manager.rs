//! TCP link manager: server/client lifecycle, reconnect scheduling, and
//! throughput accounting for configured links (§4.5).
//!
//! Each link runs on a dedicated single-threaded tokio runtime drawn
//! round-robin from a small worker pool, mirroring a fixed IO-thread-pool
//! design: one link's socket churn never starves another's.  `TcpLinkManager`
//! does not know about SL651 framing; callers register a data callback and
//! feed bytes into their own `Framer`/`Sl651Parser` pipeline, because frame
//! buffers are keyed by linkId rather than by TcpLinkManager internals.

use crate::state::{LinkState, LinkStateMachine};
use flux::{GatewayError, GatewayResult};
use parking_lot::Mutex;
use serde_json::json;
use slog::Logger;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    TcpServer,
    TcpClient,
}

impl LinkMode {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkMode::TcpServer => "TCP Server",
            LinkMode::TcpClient => "TCP Client",
        }
    }
}

pub type DataCallback = Arc<dyn Fn(i64, String, Vec<u8>) + Send + Sync>;
pub type ConnectionCallback = Arc<dyn Fn(i64, String, bool) + Send + Sync>;

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpStats {
    pub bytes_rx: i64,
    pub bytes_tx: i64,
    pub packets_rx: i64,
    pub packets_tx: i64,
}

struct LinkConnectionInfo {
    link_id: i64,
    name: String,
    mode: LinkMode,
    ip: String,
    port: u16,
    last_activity: String,
}

impl LinkConnectionInfo {
    fn to_json(&self, fsm: &LinkStateMachine, client_count: usize, clients: &[String], last_activity: &str) -> serde_json::Value {
        json!({
            "link_id": self.link_id,
            "name": self.name,
            "mode": self.mode.as_str(),
            "ip": self.ip,
            "port": self.port,
            "conn_status": fsm.state().as_str(),
            "error_msg": fsm.error_msg(),
            "client_count": client_count,
            "clients": clients,
            "last_activity": last_activity,
        })
    }
}

/// One link's live runtime state, exclusively owned by `TcpLinkManager`.
struct LinkRuntime {
    info: Mutex<LinkConnectionInfo>,
    fsm: Mutex<LinkStateMachine>,
    /// Server-mode peer writers, keyed by peer address.
    server_conns: Mutex<HashMap<String, UnboundedSender<Vec<u8>>>>,
    /// Client-mode single writer.
    client_conn: Mutex<Option<UnboundedSender<Vec<u8>>>>,
    last_activity_atomic: AtomicI64,
    /// Set by `stop`/`reload` so in-flight accept/reconnect tasks can bail
    /// out even while still holding a live `Arc`.
    retired: AtomicBool,
}

impl LinkRuntime {
    fn record_activity(&self) {
        self.last_activity_atomic.store(now_epoch(), Ordering::Relaxed);
    }
}

fn now_epoch() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn now_db_string() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Round-robin pool of dedicated single-worker-thread runtimes, one per
/// link's IO so a stalled socket on one link can't starve another.
struct WorkerPool {
    handles: Vec<tokio::runtime::Handle>,
    _runtimes: Vec<tokio::runtime::Runtime>,
    next: AtomicUsize,
}

impl WorkerPool {
    fn new(num_threads: usize) -> GatewayResult<WorkerPool> {
        let mut handles = Vec::with_capacity(num_threads);
        let mut runtimes = Vec::with_capacity(num_threads);
        for idx in 0..num_threads {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name(format!("tcp-io-{}", idx))
                .enable_all()
                .build()?;
            handles.push(rt.handle().clone());
            runtimes.push(rt);
        }
        Ok(WorkerPool {
            handles,
            _runtimes: runtimes,
            next: AtomicUsize::new(0),
        })
    }

    fn next_handle(&self) -> tokio::runtime::Handle {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.handles.len();
        self.handles[idx].clone()
    }
}

pub struct TcpLinkManager {
    logger: Logger,
    pool: Mutex<Option<WorkerPool>>,
    runtimes: Mutex<HashMap<i64, Arc<LinkRuntime>>>,
    data_callback: Mutex<Option<DataCallback>>,
    connection_callback: Mutex<Option<ConnectionCallback>>,
    bytes_rx: AtomicI64,
    bytes_tx: AtomicI64,
    packets_rx: AtomicI64,
    packets_tx: AtomicI64,
    self_weak: Weak<TcpLinkManager>,
    reconnect_base_sec: AtomicU64,
    reconnect_max_sec: AtomicU64,
    reconnect_jitter_ratio: AtomicU64,
}

impl TcpLinkManager {
    /// Private: callbacks spawned onto worker tasks need to upgrade a
    /// `Weak<TcpLinkManager>` back to the owning manager, so every instance
    /// must live inside the `Arc` built by [`TcpLinkManager::shared`].
    fn new(logger: Logger, self_weak: Weak<TcpLinkManager>) -> TcpLinkManager {
        TcpLinkManager {
            logger,
            pool: Mutex::new(None),
            runtimes: Mutex::new(HashMap::new()),
            data_callback: Mutex::new(None),
            connection_callback: Mutex::new(None),
            bytes_rx: AtomicI64::new(0),
            bytes_tx: AtomicI64::new(0),
            packets_rx: AtomicI64::new(0),
            packets_tx: AtomicI64::new(0),
            self_weak,
            reconnect_base_sec: AtomicU64::new(crate::state::RECONNECT_BASE_DELAY_SEC.to_bits()),
            reconnect_max_sec: AtomicU64::new(crate::state::RECONNECT_MAX_DELAY_SEC.to_bits()),
            reconnect_jitter_ratio: AtomicU64::new(crate::state::RECONNECT_JITTER_RATIO.to_bits()),
        }
    }

    /// Constructs a manager wrapped in the `Arc` its internal callbacks
    /// upgrade against.
    pub fn shared(logger: Logger) -> Arc<TcpLinkManager> {
        Arc::new_cyclic(|weak| TcpLinkManager::new(logger, weak.clone()))
    }

    /// Overrides the reconnect backoff parameters applied to links started
    /// from this point on (configuration-surface `RECONNECT_*` knobs).
    pub fn configure_reconnect(&self, base_sec: f64, max_sec: f64, jitter_ratio: f64) {
        self.reconnect_base_sec.store(base_sec.to_bits(), Ordering::Relaxed);
        self.reconnect_max_sec.store(max_sec.to_bits(), Ordering::Relaxed);
        self.reconnect_jitter_ratio.store(jitter_ratio.to_bits(), Ordering::Relaxed);
    }

    fn new_state_machine(&self) -> LinkStateMachine {
        LinkStateMachine::with_reconnect_policy(crate::state::ReconnectPolicy::with_params(
            f64::from_bits(self.reconnect_base_sec.load(Ordering::Relaxed)),
            f64::from_bits(self.reconnect_max_sec.load(Ordering::Relaxed)),
            f64::from_bits(self.reconnect_jitter_ratio.load(Ordering::Relaxed)),
        ))
    }

    pub fn initialize(&self, num_threads: usize) -> GatewayResult<()> {
        let mut slot = self.pool.lock();
        if slot.is_some() {
            return Err(GatewayError::already_initialized());
        }
        let threads = if num_threads == 0 {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
        } else {
            num_threads
        };
        let pool = WorkerPool::new(threads)?;
        slog::info!(self.logger, "tcp link manager initialized"; "io_threads" => threads);
        *slot = Some(pool);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.lock().is_some()
    }

    fn next_handle(&self) -> GatewayResult<tokio::runtime::Handle> {
        self.pool
            .lock()
            .as_ref()
            .map(WorkerPool::next_handle)
            .ok_or_else(|| GatewayError::validation("tcp link manager not initialized"))
    }

    pub fn set_data_callback(&self, cb: DataCallback) {
        *self.data_callback.lock() = Some(cb);
    }

    pub fn set_connection_callback(&self, cb: ConnectionCallback) {
        *self.connection_callback.lock() = Some(cb);
    }

    fn fire_data(&self, link_id: i64, peer: &str, data: Vec<u8>) {
        self.bytes_rx.fetch_add(data.len() as i64, Ordering::Relaxed);
        self.packets_rx.fetch_add(1, Ordering::Relaxed);
        if let Some(cb) = self.data_callback.lock().clone() {
            cb(link_id, peer.to_string(), data);
        }
    }

    fn fire_connection(&self, link_id: i64, peer: &str, connected: bool) {
        if let Some(cb) = self.connection_callback.lock().clone() {
            cb(link_id, peer.to_string(), connected);
        }
    }

    pub fn start_server(&self, link_id: i64, name: &str, ip: &str, port: u16) -> GatewayResult<()> {
        self.stop(link_id);
        let handle = self.next_handle()?;

        let runtime = Arc::new(LinkRuntime {
            info: Mutex::new(LinkConnectionInfo {
                link_id,
                name: name.to_string(),
                mode: LinkMode::TcpServer,
                ip: ip.to_string(),
                port,
                last_activity: now_db_string(),
            }),
            fsm: Mutex::new({
                let mut fsm = self.new_state_machine();
                fsm.on_start_server();
                fsm
            }),
            server_conns: Mutex::new(HashMap::new()),
            client_conn: Mutex::new(None),
            last_activity_atomic: AtomicI64::new(now_epoch()),
            retired: AtomicBool::new(false),
        });
        self.runtimes.lock().insert(link_id, runtime.clone());

        let addr: SocketAddr = format!("{}:{}", ip, port)
            .parse()
            .map_err(|_| GatewayError::validation(format!("invalid server address {}:{}", ip, port)))?;
        let logger = self.logger.clone();
        let this = self.weak_self();

        handle.spawn(async move {
            let listener = match TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(err) => {
                    slog::error!(logger, "tcp server bind failed"; "link_id" => link_id, "error" => %err);
                    return;
                }
            };
            slog::info!(logger, "tcp server listening"; "link_id" => link_id, "addr" => %addr);

            loop {
                if runtime.retired.load(Ordering::Relaxed) {
                    return;
                }
                let (stream, peer_addr) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(err) => {
                        slog::warn!(logger, "tcp accept failed"; "link_id" => link_id, "error" => %err);
                        continue;
                    }
                };
                let peer = peer_addr.to_string();
                let (read_half, write_half) = stream.into_split();
                let (tx, rx) = unbounded_channel();
                runtime.server_conns.lock().insert(peer.clone(), tx);
                {
                    let info = runtime.info.lock();
                    slog::info!(logger, "client connected"; "link_id" => link_id, "peer" => %peer, "name" => %info.name);
                }
                if let Some(mgr) = this.upgrade() {
                    mgr.fire_connection(link_id, &peer, true);
                }

                spawn_writer(write_half, rx);
                spawn_server_reader(runtime.clone(), this.clone(), link_id, peer, read_half);
            }
        });

        Ok(())
    }

    pub fn start_client(&self, link_id: i64, name: &str, ip: &str, port: u16) -> GatewayResult<()> {
        self.stop(link_id);
        let handle = self.next_handle()?;

        let runtime = Arc::new(LinkRuntime {
            info: Mutex::new(LinkConnectionInfo {
                link_id,
                name: name.to_string(),
                mode: LinkMode::TcpClient,
                ip: ip.to_string(),
                port,
                last_activity: now_db_string(),
            }),
            fsm: Mutex::new({
                let mut fsm = self.new_state_machine();
                fsm.on_start_client();
                fsm
            }),
            server_conns: Mutex::new(HashMap::new()),
            client_conn: Mutex::new(None),
            last_activity_atomic: AtomicI64::new(now_epoch()),
            retired: AtomicBool::new(false),
        });
        self.runtimes.lock().insert(link_id, runtime.clone());

        self.spawn_client_connect(link_id, handle, runtime);
        Ok(())
    }

    fn spawn_client_connect(&self, link_id: i64, handle: tokio::runtime::Handle, runtime: Arc<LinkRuntime>) {
        let logger = self.logger.clone();
        let this = self.weak_self();
        let (ip, port) = {
            let info = runtime.info.lock();
            (info.ip.clone(), info.port)
        };

        handle.clone().spawn(async move {
            if runtime.retired.load(Ordering::Relaxed) {
                return;
            }
            let addr = format!("{}:{}", ip, port);
            match TcpStream::connect(&addr).await {
                Ok(stream) => {
                    let peer = stream
                        .peer_addr()
                        .map(|a| a.to_string())
                        .unwrap_or_else(|_| addr.clone());
                    let (read_half, write_half) = stream.into_split();
                    let (tx, rx) = unbounded_channel();
                    *runtime.client_conn.lock() = Some(tx);
                    runtime.fsm.lock().on_connected();
                    slog::info!(logger, "connected to server"; "link_id" => link_id, "peer" => %peer);
                    if let Some(mgr) = this.upgrade() {
                        mgr.fire_connection(link_id, &peer, true);
                    }

                    spawn_writer(write_half, rx);
                    spawn_client_reader(runtime.clone(), this.clone(), link_id, peer, read_half, handle.clone());
                }
                Err(err) => {
                    runtime.fsm.lock().on_connection_error(err.to_string());
                    slog::warn!(logger, "tcp client connect failed"; "link_id" => link_id, "addr" => %addr, "error" => %err);
                    if let Some(mgr) = this.upgrade() {
                        mgr.schedule_reconnect(link_id, handle, runtime);
                    }
                }
            }
        });
    }

    fn schedule_reconnect(&self, link_id: i64, handle: tokio::runtime::Handle, runtime: Arc<LinkRuntime>) {
        let weak_runtime = Arc::downgrade(&runtime);
        let this = self.weak_self();
        let delay = runtime.fsm.lock().reconnect_delay();
        let logger = self.logger.clone();

        handle.clone().spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(mgr) = this.upgrade() else { return };
            let Some(rt) = weak_runtime.upgrade() else { return };

            let still_current = mgr
                .runtimes
                .lock()
                .get(&link_id)
                .map(|current| Arc::ptr_eq(current, &rt))
                .unwrap_or(false);
            if !still_current || rt.retired.load(Ordering::Relaxed) {
                return;
            }
            if rt.fsm.lock().state() == LinkState::Connected {
                return;
            }
            rt.fsm.lock().on_reconnecting();
            let attempts = rt.fsm.lock().reconnect_attempts();
            slog::info!(logger, "attempting reconnect"; "link_id" => link_id, "attempt" => attempts);
            mgr.spawn_client_connect(link_id, handle, rt);
        });
    }

    pub fn stop(&self, link_id: i64) {
        let runtime = self.runtimes.lock().remove(&link_id);
        let Some(runtime) = runtime else { return };
        runtime.retired.store(true, Ordering::Relaxed);
        runtime.fsm.lock().on_stop();
        runtime.server_conns.lock().clear();
        *runtime.client_conn.lock() = None;
        slog::info!(self.logger, "link stopped"; "link_id" => link_id);
    }

    pub fn stop_all(&self) {
        let ids: Vec<i64> = self.runtimes.lock().keys().copied().collect();
        for id in ids {
            self.stop(id);
        }
    }

    pub fn is_running(&self, link_id: i64) -> bool {
        self.runtimes.lock().contains_key(&link_id)
    }

    pub fn get_status(&self, link_id: i64) -> serde_json::Value {
        let runtimes = self.runtimes.lock();
        match runtimes.get(&link_id) {
            Some(runtime) => self.runtime_to_json(runtime),
            None => json!({"link_id": link_id, "conn_status": "stopped"}),
        }
    }

    pub fn get_all_status(&self) -> serde_json::Value {
        let runtimes: Vec<Arc<LinkRuntime>> = self.runtimes.lock().values().cloned().collect();
        serde_json::Value::Array(runtimes.iter().map(|rt| self.runtime_to_json(rt)).collect())
    }

    fn runtime_to_json(&self, runtime: &LinkRuntime) -> serde_json::Value {
        let info = runtime.info.lock();
        let fsm = runtime.fsm.lock();
        let clients: Vec<String> = runtime.server_conns.lock().keys().cloned().collect();
        info.to_json(&fsm, clients.len(), &clients, &info.last_activity)
    }

    pub fn reload(&self, link_id: i64, name: &str, mode: LinkMode, ip: &str, port: u16, enabled: bool) -> GatewayResult<()> {
        if !enabled {
            self.stop(link_id);
            return Ok(());
        }
        match mode {
            LinkMode::TcpServer => self.start_server(link_id, name, ip, port),
            LinkMode::TcpClient => self.start_client(link_id, name, ip, port),
        }
    }

    pub fn send_data(&self, link_id: i64, data: &[u8]) -> bool {
        let runtimes = self.runtimes.lock();
        let Some(runtime) = runtimes.get(&link_id) else { return false };

        if let Some(tx) = runtime.client_conn.lock().as_ref() {
            if tx.send(data.to_vec()).is_ok() {
                self.bytes_tx.fetch_add(data.len() as i64, Ordering::Relaxed);
                self.packets_tx.fetch_add(1, Ordering::Relaxed);
                return true;
            }
        }

        let conns = runtime.server_conns.lock();
        if conns.is_empty() {
            return false;
        }
        let mut sent = 0;
        for tx in conns.values() {
            if tx.send(data.to_vec()).is_ok() {
                sent += 1;
            }
        }
        if sent > 0 {
            self.bytes_tx.fetch_add(data.len() as i64 * sent as i64, Ordering::Relaxed);
            self.packets_tx.fetch_add(sent, Ordering::Relaxed);
        }
        sent > 0
    }

    pub fn send_to_client(&self, link_id: i64, client_addr: &str, data: &[u8]) -> bool {
        let runtimes = self.runtimes.lock();
        let Some(runtime) = runtimes.get(&link_id) else { return false };
        let conns = runtime.server_conns.lock();
        match conns.get(client_addr) {
            Some(tx) if tx.send(data.to_vec()).is_ok() => {
                self.bytes_tx.fetch_add(data.len() as i64, Ordering::Relaxed);
                self.packets_tx.fetch_add(1, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    /// Drops every server-mode peer connection on `link_id` so devices
    /// re-register after a registration-affecting config change.
    pub fn disconnect_server_clients(&self, link_id: i64) {
        let runtimes = self.runtimes.lock();
        let Some(runtime) = runtimes.get(&link_id) else { return };
        let mut conns = runtime.server_conns.lock();
        let count = conns.len();
        conns.clear();
        if count > 0 {
            slog::info!(self.logger, "disconnected server clients for re-registration"; "link_id" => link_id, "count" => count);
        }
    }

    pub fn get_tcp_stats(&self) -> TcpStats {
        TcpStats {
            bytes_rx: self.bytes_rx.load(Ordering::Relaxed),
            bytes_tx: self.bytes_tx.load(Ordering::Relaxed),
            packets_rx: self.packets_rx.load(Ordering::Relaxed),
            packets_tx: self.packets_tx.load(Ordering::Relaxed),
        }
    }

    fn weak_self(&self) -> Weak<TcpLinkManager> {
        self.self_weak.clone()
    }
}

fn spawn_writer(mut write_half: OwnedWriteHalf, mut rx: tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>) {
    tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            if write_half.write_all(&chunk).await.is_err() {
                return;
            }
        }
    });
}

fn spawn_server_reader(
    runtime: Arc<LinkRuntime>,
    manager: Weak<TcpLinkManager>,
    link_id: i64,
    peer: String,
    mut read_half: tokio::net::tcp::OwnedReadHalf,
) {
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        loop {
            match read_half.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    runtime.record_activity();
                    if let Some(mgr) = manager.upgrade() {
                        mgr.fire_data(link_id, &peer, buf[..n].to_vec());
                    }
                }
            }
        }
        runtime.server_conns.lock().remove(&peer);
        if let Some(mgr) = manager.upgrade() {
            mgr.fire_connection(link_id, &peer, false);
        }
    });
}

fn spawn_client_reader(
    runtime: Arc<LinkRuntime>,
    manager: Weak<TcpLinkManager>,
    link_id: i64,
    peer: String,
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    handle: tokio::runtime::Handle,
) {
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        loop {
            match read_half.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    runtime.record_activity();
                    if let Some(mgr) = manager.upgrade() {
                        mgr.fire_data(link_id, &peer, buf[..n].to_vec());
                    }
                }
            }
        }
        *runtime.client_conn.lock() = None;
        runtime.fsm.lock().on_disconnected();
        if let Some(mgr) = manager.upgrade() {
            mgr.fire_connection(link_id, &peer, false);
            if !runtime.retired.load(Ordering::Relaxed) {
                mgr.schedule_reconnect(link_id, handle, runtime.clone());
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[test]
    fn uninitialized_manager_rejects_start() {
        let mgr = TcpLinkManager::shared(test_logger());
        let err = mgr.start_server(1, "test", "127.0.0.1", 9000).unwrap_err();
        assert!(matches!(err.kind, flux::ErrorKind::Validation));
    }

    #[test]
    fn double_initialize_is_rejected() {
        let mgr = TcpLinkManager::shared(test_logger());
        mgr.initialize(1).unwrap();
        assert!(mgr.initialize(1).is_err());
    }

    #[test]
    fn status_for_unknown_link_reports_stopped() {
        let mgr = TcpLinkManager::shared(test_logger());
        let status = mgr.get_status(42);
        assert_eq!(status["conn_status"], "stopped");
    }

    #[test]
    fn send_to_unknown_link_fails() {
        let mgr = TcpLinkManager::shared(test_logger());
        assert!(!mgr.send_data(1, b"hello"));
    }
}
