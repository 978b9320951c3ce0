//! Failsafe recovery server binary.
//!
//! # Usage
//!
//! ```bash
//! # Simulated 128 MiB flash, no DHCP (development)
//! failsafe-server --bind 127.0.0.1:8080
//!
//! # Against a real flash dump with DHCP, as on a recovery LAN
//! failsafe-server --bind 192.168.1.1:80 --flash-image nand.bin --dhcp
//! ```

use std::{
    collections::BTreeMap,
    net::Ipv4Addr,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use clap::Parser;
use failsafe_core::{
    board::BoardInfo,
    console::{DEFAULT_RING_CAPACITY, WebConsole},
    env::{EnvError, EnvPersist, EnvStore},
    image::AcceptAll,
    layout::{Layout, LayoutTable},
    storage::{FileBlock, FileFlash, MemFlash, StoragePool},
    upload::UploadSlot,
};
use failsafe_http::{ReadLimits, text::parse_size};
use failsafe_server::{
    DhcpSetup, Server, ServerConfig, ServerError, ServerState, SessionOutcome, SystemControl,
    dhcp::DhcpConfig, interp::ShellInterpreter,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Failsafe recovery web server
#[derive(Parser, Debug)]
#[command(name = "failsafe-server")]
#[command(about = "Bootloader-style failsafe recovery web UI")]
#[command(version)]
struct Args {
    /// Address to bind the HTTP listener to
    #[arg(short, long, default_value = "0.0.0.0:80")]
    bind: String,

    /// Raw flash image to operate on (simulated flash when omitted)
    #[arg(long)]
    flash_image: Option<PathBuf>,

    /// Flash erase block size (decimal, 0x hex, k/kb/kib suffix)
    #[arg(long, default_value = "0x20000")]
    erase_size: String,

    /// Simulated flash size when no image is given
    #[arg(long, default_value = "0x8000000")]
    flash_size: String,

    /// Flash layout `label:name@offset+size;…` (repeatable; first is the
    /// default)
    #[arg(long = "flash-layout")]
    flash_layouts: Vec<String>,

    /// Raw block-device (MMC) image; the block backend is absent when
    /// omitted
    #[arg(long)]
    mmc_image: Option<PathBuf>,

    /// Block device partitions `name@offset+size;…`
    #[arg(long)]
    mmc_layout: Option<String>,

    /// File the environment blob is persisted to
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Maximum accepted upload body
    #[arg(long, default_value = "0x10000000")]
    max_body: String,

    /// Version string served by /version
    #[arg(long, default_value = concat!("failsafe ", env!("CARGO_PKG_VERSION")))]
    version_string: String,

    /// Board model for /sysinfo
    #[arg(long)]
    board_model: Option<String>,

    /// Board compatible string for /sysinfo
    #[arg(long)]
    board_compatible: Option<String>,

    /// CPU compatible string for /sysinfo
    #[arg(long)]
    cpu_compatible: Option<String>,

    /// CPU clock in Hz for /sysinfo
    #[arg(long, default_value_t = 0)]
    cpu_clock_hz: u64,

    /// RAM size in bytes for /sysinfo
    #[arg(long, default_value = "0")]
    ram_size: String,

    /// Console prompt when env `prompt` is unset
    #[arg(long, default_value = "FS> ")]
    prompt: String,

    /// Enable the DHCP responder
    #[arg(long)]
    dhcp: bool,

    /// Address handed out as server/router identifier
    #[arg(long, default_value = "192.168.1.1")]
    dhcp_server_ip: Ipv4Addr,

    /// Subnet mask for DHCP leases
    #[arg(long, default_value = "255.255.255.0")]
    dhcp_netmask: Ipv4Addr,

    /// DHCP lease time in seconds
    #[arg(long, default_value_t = 600)]
    dhcp_lease_secs: u32,

    /// DHCP listen port
    #[arg(long, default_value_t = 67)]
    dhcp_port: u16,

    /// DHCP reply port
    #[arg(long, default_value_t = 68)]
    dhcp_reply_port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Env blob persistence into a plain file.
struct FileEnv {
    path: PathBuf,
}

impl EnvPersist for FileEnv {
    fn save(&mut self, blob: &[u8]) -> Result<(), EnvError> {
        std::fs::write(&self.path, blob).map_err(|e| EnvError::Persist(e.to_string()))
    }
}

/// Env blob persistence into the `env` partition through the storage
/// facade.
struct PartitionEnv {
    pool: StoragePool,
}

impl EnvPersist for PartitionEnv {
    fn save(&mut self, blob: &[u8]) -> Result<(), EnvError> {
        let target = self
            .pool
            .open(failsafe_core::storage::StorageSelect::Auto, "env")
            .map_err(|e| EnvError::Persist(e.to_string()))?;
        target.restore(0, blob).map_err(|e| EnvError::Persist(e.to_string()))
    }
}

const DEFAULT_LAYOUT: &str = "default:bl2@0x0+0x100000;factory@0x100000+0x80000;\
                              fip@0x180000+0x200000;env@0x380000+0x80000;\
                              firmware@0x400000+0x7c00000";

fn size_arg(value: &str, what: &str) -> Result<u64, ServerError> {
    parse_size(value).ok_or_else(|| ServerError::Config(format!("invalid {what}: '{value}'")))
}

fn build_state(args: &Args) -> Result<Arc<ServerState>, ServerError> {
    let erase_size = size_arg(&args.erase_size, "erase size")?;

    // Environment first: the persisted layout label influences the
    // partition table.
    let mut defaults = BTreeMap::new();
    defaults.insert("bootdelay".to_string(), b"3".to_vec());
    let mut env_store = EnvStore::new(defaults);
    if let Some(path) = &args.env_file {
        if let Ok(blob) = std::fs::read(path)
            && let Err(err) = env_store.import_blob(&blob)
        {
            tracing::warn!(%err, "ignoring unreadable env file");
        }
        env_store = env_store.with_persist(Box::new(FileEnv { path: path.clone() }));
    }

    let layout_specs: Vec<&str> = if args.flash_layouts.is_empty() {
        vec![DEFAULT_LAYOUT]
    } else {
        args.flash_layouts.iter().map(String::as_str).collect()
    };
    let layouts = layout_specs
        .iter()
        .map(|spec| Layout::parse(spec))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Config(e.to_string()))?;
    let table = LayoutTable::new(layouts, env_store.get_str("mtd_layout_label"))
        .map_err(|e| ServerError::Config(e.to_string()))?;

    let flash: Arc<dyn failsafe_core::storage::FlashDevice> = match &args.flash_image {
        Some(path) => Arc::new(
            FileFlash::open(path, erase_size).map_err(|e| ServerError::Config(e.to_string()))?,
        ),
        None => {
            let size = size_arg(&args.flash_size, "flash size")?;
            Arc::new(MemFlash::new(size, erase_size))
        },
    };
    let mut pool = StoragePool::new().with_flash(flash, table.current().parts.clone());

    if let Some(path) = &args.mmc_image {
        let dev =
            FileBlock::open(path).map_err(|e| ServerError::Config(e.to_string()))?;
        let parts = match &args.mmc_layout {
            Some(spec) => {
                Layout::parse(&format!("mmc:{spec}"))
                    .map_err(|e| ServerError::Config(e.to_string()))?
                    .parts
            },
            None => Vec::new(),
        };
        pool = pool.with_block(Arc::new(dev), parts);
    }

    // Without an explicit env file, the blob lives on the `env`
    // partition: load what is there and persist back through the facade.
    if args.env_file.is_none()
        && let Ok(target) = pool.open(failsafe_core::storage::StorageSelect::Auto, "env")
    {
        let mut blob = vec![0u8; failsafe_core::env::ENV_BLOB_SIZE];
        if target.read(0, &mut blob).is_ok()
            && let Err(err) = env_store.import_blob(&blob)
        {
            tracing::debug!(%err, "env partition holds no valid blob");
        }
        env_store = env_store.with_persist(Box::new(PartitionEnv { pool: pool.clone() }));
    }

    let board = BoardInfo {
        model: args.board_model.clone(),
        compatible: args.board_compatible.clone(),
        cpu_compatible: args.cpu_compatible.clone(),
        cpu_clock_hz: args.cpu_clock_hz,
        ram_size: size_arg(&args.ram_size, "ram size")?,
    };

    let env = Arc::new(Mutex::new(env_store));
    let interpreter = ShellInterpreter::new(Arc::clone(&env), args.version_string.clone());

    let mut console = WebConsole::new(DEFAULT_RING_CAPACITY);
    // Record from the start so early boot output reaches the browser.
    console.ensure_recording();

    Ok(Arc::new(ServerState {
        pool,
        env,
        console: Mutex::new(console),
        upload: Mutex::new(UploadSlot::new()),
        layouts: table.has_alternates().then(|| Mutex::new(table)),
        board,
        version: args.version_string.clone(),
        default_prompt: args.prompt.clone(),
        validator: Box::new(AcceptAll),
        interpreter: Mutex::new(Box::new(interpreter)),
        control: SystemControl::default(),
    }))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ServerError> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let state = build_state(&args)?;

    let dhcp = args.dhcp.then_some(DhcpSetup {
        config: DhcpConfig {
            server_ip: args.dhcp_server_ip,
            netmask: args.dhcp_netmask,
            lease_secs: args.dhcp_lease_secs,
        },
        listen_port: args.dhcp_port,
        reply_port: args.dhcp_reply_port,
    });

    let config = ServerConfig {
        bind: args.bind.clone(),
        limits: ReadLimits {
            max_body: size_arg(&args.max_body, "max body")? as usize,
            ..ReadLimits::default()
        },
        dhcp,
    };

    let server = Server::bind(config, state).await?;
    tracing::info!("web failsafe UI started");
    tracing::info!("URL: http://{}/", server.local_addr()?);

    match server.run().await? {
        SessionOutcome::Reboot => {
            tracing::info!("session closed, rebooting device");
        },
        SessionOutcome::BootInitramfs(image) => {
            tracing::info!(size = image.len(), "session closed, booting uploaded initramfs");
        },
    }

    Ok(())
}
