//! Listener construction and accept loops.
//!
//! Sockets are built through `socket2` so `SO_REUSEPORT` can be enabled,
//! which lets the kernel load-balance one bind address across several
//! accept loops (one per CPU core) on Linux. With reuse-port off there is a
//! single acceptor per service, which is plenty for a master server's
//! connection rate.

use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Context as _;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};

#[cfg(any(target_os = "linux", target_os = "android"))]
use std::os::fd::AsRawFd;

use crate::connection;
use crate::state::SharedState;

/// Which protocol a listener serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Plasma,
    Theater,
}

impl Service {
    fn name(self) -> &'static str {
        match self {
            Service::Plasma => "plasma",
            Service::Theater => "theater",
        }
    }
}

/// Builds the accept sockets for one bind address: a single listener, or
/// one per core when reuse-port is enabled.
pub fn build_listeners(bind: SocketAddr, use_reuse_port: bool) -> anyhow::Result<Vec<TcpListener>> {
    let acceptors = if use_reuse_port { num_cpus::get() } else { 1 };
    let mut listeners = Vec::with_capacity(acceptors);

    for _ in 0..acceptors {
        let domain = if bind.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .context("socket creation failed")?;
        socket.set_reuse_address(true).ok();

        if use_reuse_port {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            {
                let sockfd = socket.as_raw_fd();
                let optval: libc::c_int = 1;
                let ret = unsafe {
                    libc::setsockopt(
                        sockfd,
                        libc::SOL_SOCKET,
                        libc::SO_REUSEPORT,
                        &optval as *const _ as *const libc::c_void,
                        std::mem::size_of_val(&optval) as libc::socklen_t,
                    )
                };
                if ret != 0 {
                    warn!(
                        "failed to set SO_REUSEPORT: {}",
                        std::io::Error::last_os_error()
                    );
                }
            }
            #[cfg(not(any(target_os = "linux", target_os = "android")))]
            warn!("reuse-port requested but not supported on this platform");
        }

        socket
            .set_nonblocking(true)
            .context("failed to set non-blocking")?;
        socket
            .bind(&bind.into())
            .with_context(|| format!("failed to bind {bind}"))?;
        socket.listen(1024).context("listen failed")?;

        let std_listener: StdTcpListener = socket.into();
        listeners.push(TcpListener::from_std(std_listener).context("tokio listener")?);
    }

    Ok(listeners)
}

/// Spawns one accept loop per listener. Each accepted connection gets its
/// own worker task; the per-service connection cap is enforced here.
pub fn spawn_acceptors(
    shared: Arc<SharedState>,
    listeners: Vec<TcpListener>,
    service: Service,
) -> Vec<JoinHandle<()>> {
    listeners
        .into_iter()
        .map(|listener| {
            let shared = shared.clone();
            tokio::spawn(async move {
                accept_loop(shared, listener, service).await;
            })
        })
        .collect()
}

async fn accept_loop(shared: Arc<SharedState>, listener: TcpListener, service: Service) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(error) => {
                warn!(%error, "accept failed");
                continue;
            }
        };

        let counter = match service {
            Service::Plasma => &shared.plasma_connections,
            Service::Theater => &shared.theater_connections,
        };
        if counter.load(Ordering::Relaxed) >= shared.config.max_connections {
            warn!(%peer, "connection limit reached, rejecting");
            drop(stream);
            continue;
        }
        counter.fetch_add(1, Ordering::Relaxed);

        let connection_id = shared.next_connection_id();
        info!(%peer, connection_id, service = service.name(), "-- connected");

        let shared_for_task = shared.clone();
        let span = info_span!("connection", service = service.name(), id = connection_id, %peer);
        tokio::spawn(
            async move {
                match service {
                    Service::Plasma => {
                        connection::plasma::run(shared_for_task.clone(), stream, peer, connection_id)
                            .await;
                        shared_for_task
                            .plasma_connections
                            .fetch_sub(1, Ordering::Relaxed);
                    }
                    Service::Theater => {
                        connection::theater::run(shared_for_task.clone(), stream, peer, connection_id)
                            .await;
                        shared_for_task
                            .theater_connections
                            .fetch_sub(1, Ordering::Relaxed);
                    }
                }
                info!("-- disconnected");
            }
            .instrument(span),
        );
    }
}
