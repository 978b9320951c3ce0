//! End-to-end endpoint tests over real sockets.
//!
//! Each test binds the server on an ephemeral port, drives it with raw
//! HTTP/1.1 requests (`Connection: close` per request, like the real UI),
//! and asserts on the wire bytes.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use failsafe_core::{
    board::BoardInfo,
    console::{DEFAULT_RING_CAPACITY, WebConsole},
    env::{ENV_BLOB_SIZE, EnvStore},
    image::AcceptAll,
    layout::{Layout, LayoutTable},
    storage::{MemBlock, MemFlash, Partition, StoragePool, StorageSelect},
    upload::UploadSlot,
};
use failsafe_http::ReadLimits;
use failsafe_server::{
    Server, ServerConfig, ServerState, SessionOutcome, SystemControl, interp::ShellInterpreter,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const VERSION: &str = "failsafe test 2026.08";
const ERASE: u64 = 0x10000;

fn test_state() -> Arc<ServerState> {
    let flash = Arc::new(MemFlash::new(0x400000, ERASE).with_model("w25q32"));
    let parts = vec![
        Partition { name: "bootloader".to_string(), offset: 0, size: 0x20000 },
        Partition { name: "firmware".to_string(), offset: 0x20000, size: 0x200000 },
        Partition { name: "fip".to_string(), offset: 0x220000, size: 0x100000 },
    ];
    let block = Arc::new(MemBlock::new(0x100000, 512).with_product("emmc-sim"));
    let block_parts = vec![Partition { name: "boot".to_string(), offset: 0x1000, size: 0x8000 }];

    let pool = StoragePool::new().with_flash(flash, parts).with_block(block, block_parts);

    let mut defaults = BTreeMap::new();
    defaults.insert("bootdelay".to_string(), b"3".to_vec());
    let env = Arc::new(Mutex::new(EnvStore::new(defaults)));
    let interpreter = ShellInterpreter::new(Arc::clone(&env), VERSION.to_string());

    let layouts = vec![
        Layout::parse("default:a@0+4096").unwrap(),
        Layout::parse("large:a@0+8192").unwrap(),
    ];

    let mut console = WebConsole::new(DEFAULT_RING_CAPACITY);
    console.ensure_recording();

    Arc::new(ServerState {
        pool,
        env,
        console: Mutex::new(console),
        upload: Mutex::new(UploadSlot::new()),
        layouts: Some(Mutex::new(LayoutTable::new(layouts, None).unwrap())),
        board: BoardInfo {
            model: Some("Rescue Board (rev A)".to_string()),
            compatible: Some("vendor,rescue-board".to_string()),
            cpu_compatible: Some("arm,cortex-a53".to_string()),
            cpu_clock_hz: 1_300_000_000,
            ram_size: 512 * 1024 * 1024,
        },
        version: VERSION.to_string(),
        default_prompt: "FS> ".to_string(),
        validator: Box::new(AcceptAll),
        interpreter: Mutex::new(Box::new(interpreter)),
        control: SystemControl::default(),
    })
}

async fn start(state: Arc<ServerState>) -> (std::net::SocketAddr, tokio::task::JoinHandle<SessionOutcome>) {
    let config = ServerConfig {
        bind: "127.0.0.1:0".to_string(),
        limits: ReadLimits::default(),
        dhcp: None,
    };
    let server = Server::bind(config, state).await.unwrap();
    let addr = server.local_addr().unwrap();
    let handle = tokio::spawn(async move { server.run().await.unwrap() });
    (addr, handle)
}

async fn send(addr: std::net::SocketAddr, raw: &[u8]) -> String {
    String::from_utf8_lossy(&send_raw(addr, raw).await).into_owned()
}

async fn send_raw(addr: std::net::SocketAddr, raw: &[u8]) -> Vec<u8> {
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw).await.unwrap();
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    reply
}

fn body_of(response: &str) -> &str {
    response.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or("")
}

fn post_form(path: &str, fields: &[(&str, &str)]) -> Vec<u8> {
    let body: String = fields
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let mut raw = format!(
        "POST {path} HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    raw.extend_from_slice(body.as_bytes());
    raw
}

fn post_multipart(path: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    const BOUNDARY: &str = "----testboundary9283";
    let mut body = Vec::new();
    for (name, filename, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(f) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let mut raw = format!(
        "POST {path} HTTP/1.1\r\nContent-Type: multipart/form-data; boundary={BOUNDARY}\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    raw.extend_from_slice(&body);
    raw
}

#[tokio::test]
async fn version_returns_configured_string() {
    let (addr, _handle) = start(test_state()).await;
    let reply = send(addr, b"GET /version HTTP/1.1\r\nHost: t\r\n\r\n").await;

    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(reply.contains("Content-Type: text/plain\r\n"));
    assert!(reply.contains("Connection: close\r\n"));
    assert_eq!(body_of(&reply), VERSION);
}

#[tokio::test]
async fn upload_reports_size_and_md5() {
    let (addr, _handle) = start(test_state()).await;

    let image = vec![0xAAu8; 1_048_576];
    let reply = send(
        addr,
        &post_multipart("/upload", &[("firmware", Some("fw.bin"), &image)]),
    )
    .await;

    let digest = md5::compute(&image);
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body_of(&reply), format!("1048576 {digest:x}"));
}

#[tokio::test]
async fn upload_without_image_fails_with_legacy_body() {
    let (addr, _handle) = start(test_state()).await;
    let reply = send(addr, &post_multipart("/upload", &[("other", None, b"x")])).await;
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body_of(&reply), "fail");
}

#[tokio::test]
async fn upload_rejects_initramfs_without_fdt_header() {
    let (addr, _handle) = start(test_state()).await;
    let reply =
        send(addr, &post_multipart("/upload", &[("initramfs", Some("rd.bin"), b"not a dtb")]))
            .await;
    assert_eq!(body_of(&reply), "fail");
}

#[tokio::test]
async fn flash_read_returns_exact_json() {
    let state = test_state();
    let (addr, _handle) = start(Arc::clone(&state)).await;

    // Seed 00..0F at offset 0 of the bootloader partition.
    let data: Vec<u8> = (0..16).collect();
    let hex: String = data.iter().map(|b| format!("{b:02x}")).collect();
    let reply = send(
        addr,
        &post_form(
            "/flash/write",
            &[("storage", "mtd"), ("target", "bootloader"), ("start", "0"), ("data", &hex)],
        ),
    )
    .await;
    assert_eq!(body_of(&reply), "{\"ok\":true,\"written\":16}\n");

    let reply = send(
        addr,
        &post_form(
            "/flash/read",
            &[("storage", "mtd"), ("target", "bootloader"), ("start", "0"), ("end", "16")],
        ),
    )
    .await;
    assert!(reply.contains("Content-Type: application/json\r\n"));
    assert_eq!(
        body_of(&reply),
        "{\"ok\":true,\"start\":\"0x0\",\"end\":\"0x10\",\"size\":16,\"data\":\"00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f\"}\n"
    );
}

#[tokio::test]
async fn flash_write_preserves_surrounding_block() {
    let state = test_state();
    let (addr, _handle) = start(Arc::clone(&state)).await;

    // Seed the whole first erase block through the facade.
    let seed: Vec<u8> = (0..ERASE).map(|i| (i % 199) as u8).collect();
    let target = state.pool.open(StorageSelect::Flash, "bootloader").unwrap();
    target.restore(0, &seed).unwrap();

    let reply = send(
        addr,
        &post_form(
            "/flash/write",
            &[("storage", "mtd"), ("target", "bootloader"), ("start", "0x10"), ("data", "deadbeef")],
        ),
    )
    .await;
    assert_eq!(body_of(&reply), "{\"ok\":true,\"written\":4}\n");

    let mut got = vec![0u8; ERASE as usize];
    target.read(0, &mut got).unwrap();
    assert_eq!(&got[..0x10], &seed[..0x10]);
    assert_eq!(&got[0x10..0x14], &[0xde, 0xad, 0xbe, 0xef]);
    assert_eq!(&got[0x14..], &seed[0x14..]);
}

#[tokio::test]
async fn flash_read_caps_at_4k() {
    let (addr, _handle) = start(test_state()).await;
    let reply = send(
        addr,
        &post_form(
            "/flash/read",
            &[("target", "bootloader"), ("start", "0"), ("end", "0x1001")],
        ),
    )
    .await;
    assert!(reply.starts_with("HTTP/1.1 413 "));
    assert_eq!(body_of(&reply), "{\"ok\":false,\"error\":\"too_large\"}\n");
}

#[tokio::test]
async fn flash_requires_post() {
    let (addr, _handle) = start(test_state()).await;
    let reply = send(addr, b"GET /flash/read?target=bootloader HTTP/1.1\r\n\r\n").await;
    assert!(reply.starts_with("HTTP/1.1 405 "));
    assert_eq!(body_of(&reply), "{\"ok\":false,\"error\":\"method\"}\n");
}

#[tokio::test]
async fn flash_unknown_target_is_404() {
    let (addr, _handle) = start(test_state()).await;
    let reply = send(
        addr,
        &post_form("/flash/read", &[("target", "ghost"), ("start", "0"), ("end", "16")]),
    )
    .await;
    assert!(reply.starts_with("HTTP/1.1 404 "));
    assert_eq!(body_of(&reply), "{\"ok\":false,\"error\":\"target_not_found\"}\n");
}

#[tokio::test]
async fn backup_part_streams_whole_partition() {
    let state = test_state();
    let (addr, _handle) = start(Arc::clone(&state)).await;

    let seed: Vec<u8> = (0..0x200000u32).map(|i| (i % 241) as u8).collect();
    let target = state.pool.open(StorageSelect::Flash, "firmware").unwrap();
    target.restore(0, &seed).unwrap();

    let reply =
        send_raw(addr, b"GET /backup/main?target=firmware&mode=part HTTP/1.1\r\n\r\n").await;
    let split = reply.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
    let head = String::from_utf8_lossy(&reply[..split]);
    let body = &reply[split + 4..];

    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert!(head.contains("Content-Type: application/octet-stream"));
    assert!(head.contains("Content-Length: 2097152"));
    assert!(head.contains(
        "Content-Disposition: attachment; filename=\"backup_mtd_w25q32_firmware_0x0-0x200000.bin\""
    ));
    assert_eq!(body.len(), seed.len());
    assert_eq!(body, seed);
}

#[tokio::test]
async fn backup_range_and_restore_roundtrip() {
    let state = test_state();
    let (addr, _handle) = start(Arc::clone(&state)).await;

    let seed: Vec<u8> = (0..0x20000u32).map(|i| (i % 13) as u8).collect();
    let target = state.pool.open(StorageSelect::Flash, "fip").unwrap();
    target.restore(0, &seed).unwrap();

    // Download a sub-range.
    let reply = send_raw(
        addr,
        &post_form(
            "/backup/main",
            &[("mode", "range"), ("target", "fip"), ("start", "0x100"), ("end", "0x1100")],
        ),
    )
    .await;
    let split = reply.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
    let backup = reply[split + 4..].to_vec();
    assert_eq!(backup, &seed[0x100..0x1100]);

    // Wipe, then restore through the upload path using the synthesized
    // filename alone.
    target.restore(0, &vec![0u8; 0x20000]).unwrap();
    let reply = send(
        addr,
        &post_multipart(
            "/flash/restore",
            &[("backup", Some("backup_mtd_w25q32_fip_0x100-0x1100.bin"), &backup)],
        ),
    )
    .await;
    assert_eq!(body_of(&reply), "{\"ok\":true,\"restored\":4096}\n");

    let mut got = vec![0u8; 0x1000];
    target.read(0x100, &mut got).unwrap();
    assert_eq!(got, &seed[0x100..0x1100]);
}

#[tokio::test]
async fn restore_size_mismatch_is_rejected() {
    let (addr, _handle) = start(test_state()).await;
    let reply = send(
        addr,
        &post_multipart(
            "/flash/restore",
            &[("backup", Some("backup_mtd_w25q32_fip_0x0-0x1000.bin"), b"short")],
        ),
    )
    .await;
    assert_eq!(body_of(&reply), "{\"ok\":false,\"error\":\"bad_range\"}\n");
}

#[tokio::test]
async fn backup_info_lists_both_backends() {
    let (addr, _handle) = start(test_state()).await;
    let reply = send(addr, b"GET /backup/info HTTP/1.1\r\n\r\n").await;
    let parsed: serde_json::Value = serde_json::from_str(body_of(&reply)).unwrap();

    assert_eq!(parsed["mtd"]["present"], true);
    assert_eq!(parsed["mtd"]["model"], "w25q32");
    assert_eq!(parsed["mtd"]["parts"][1]["name"], "firmware");
    assert_eq!(parsed["mtd"]["parts"][1]["size"], 0x200000);
    assert_eq!(parsed["mmc"]["present"], true);
    assert_eq!(parsed["mmc"]["product"], "emmc-sim");
    assert_eq!(parsed["mmc"]["parts"][0]["name"], "boot");
}

#[tokio::test]
async fn sysinfo_reports_board_identity() {
    let (addr, _handle) = start(test_state()).await;
    let reply = send(addr, b"GET /sysinfo HTTP/1.1\r\n\r\n").await;
    let parsed: serde_json::Value = serde_json::from_str(body_of(&reply)).unwrap();

    assert_eq!(parsed["board"]["model"], "Rescue Board (rev A)");
    assert_eq!(parsed["board"]["compatible"], "vendor,rescue-board");
    assert_eq!(parsed["cpu"]["compatible"], "arm,cortex-a53");
    assert_eq!(parsed["cpu"]["clock_hz"], 1_300_000_000u64);
    assert_eq!(parsed["ram"]["size"], 512u64 * 1024 * 1024);
}

#[tokio::test]
async fn getmtdlayout_lists_labels() {
    let (addr, _handle) = start(test_state()).await;
    let reply = send(addr, b"GET /getmtdlayout HTTP/1.1\r\n\r\n").await;
    assert_eq!(body_of(&reply), "default;default;large;");
}

#[tokio::test]
async fn env_set_list_unset_roundtrip() {
    let (addr, _handle) = start(test_state()).await;

    let reply =
        send(addr, &post_form("/env/set", &[("name", "ipaddr"), ("value", "192.168.1.5")])).await;
    assert_eq!(body_of(&reply), "ok");

    let reply = send(addr, b"GET /env/list HTTP/1.1\r\n\r\n").await;
    assert!(body_of(&reply).lines().any(|l| l == "ipaddr=192.168.1.5"));
    assert!(body_of(&reply).lines().any(|l| l == "bootdelay=3"));

    let reply = send(addr, &post_form("/env/unset", &[("name", "ipaddr")])).await;
    assert_eq!(body_of(&reply), "ok");

    let reply = send(addr, b"GET /env/list HTTP/1.1\r\n\r\n").await;
    assert!(!body_of(&reply).contains("ipaddr="));
}

#[tokio::test]
async fn env_endpoints_enforce_methods() {
    let (addr, _handle) = start(test_state()).await;

    let reply = send(addr, &post_form("/env/list", &[])).await;
    assert!(reply.starts_with("HTTP/1.1 405 "));

    let reply = send(addr, b"GET /env/reset HTTP/1.1\r\n\r\n").await;
    assert!(reply.starts_with("HTTP/1.1 405 "));
}

#[tokio::test]
async fn env_restore_accepts_exported_blob() {
    let state = test_state();
    let (addr, _handle) = start(Arc::clone(&state)).await;

    let blob = {
        let mut env = state.env.lock().unwrap();
        env.set("restored_key", b"yes").unwrap();
        let blob = env.export_blob();
        env.unset("restored_key").unwrap();
        blob
    };
    assert_eq!(blob.len(), ENV_BLOB_SIZE);

    let reply = send(
        addr,
        &post_multipart("/env/restore", &[("envfile", Some("env.bin"), &blob)]),
    )
    .await;
    assert_eq!(body_of(&reply), "ok");

    let reply = send(addr, b"GET /env/list HTTP/1.1\r\n\r\n").await;
    assert!(body_of(&reply).lines().any(|l| l == "restored_key=yes"));
}

#[tokio::test]
async fn env_restore_rejects_short_blob() {
    let (addr, _handle) = start(test_state()).await;
    let reply = send(
        addr,
        &post_multipart("/env/restore", &[("envfile", Some("env.bin"), &[0u8; 100])]),
    )
    .await;
    assert!(reply.starts_with("HTTP/1.1 400 "));
    assert_eq!(body_of(&reply), "bad file");
}

#[tokio::test]
async fn console_exec_then_poll_shows_transcript() {
    let (addr, _handle) = start(test_state()).await;

    let reply = send(addr, &post_form("/console/exec", &[("cmd", "printenv")])).await;
    let parsed: serde_json::Value = serde_json::from_str(body_of(&reply)).unwrap();
    assert_eq!(parsed["ok"], true);
    assert_eq!(parsed["ret"], 0);
    assert_eq!(parsed["cmd"], "printenv");

    let reply = send(addr, &post_form("/console/poll", &[])).await;
    let parsed: serde_json::Value = serde_json::from_str(body_of(&reply)).unwrap();
    let data = parsed["data"].as_str().unwrap();
    assert!(data.contains("printenv"));
    assert!(data.contains("FS>"));
    assert!(data.contains("bootdelay=3"));
}

#[tokio::test]
async fn console_requires_token_when_configured() {
    let state = test_state();
    {
        let mut env = state.env.lock().unwrap();
        env.set("failsafe_console_token", b"sekrit").unwrap();
    }
    let (addr, _handle) = start(state).await;

    let reply = send(addr, &post_form("/console/clear", &[])).await;
    assert!(reply.starts_with("HTTP/1.1 403 "));

    let reply = send(addr, &post_form("/console/clear", &[("token", "wrong")])).await;
    assert!(reply.starts_with("HTTP/1.1 403 "));

    let reply = send(addr, &post_form("/console/clear", &[("token", "sekrit")])).await;
    assert!(reply.starts_with("HTTP/1.1 200 "));
    assert_eq!(body_of(&reply), "{\"ok\":true}\n");
}

#[tokio::test]
async fn console_endpoints_require_post() {
    let (addr, _handle) = start(test_state()).await;
    let reply = send(addr, b"GET /console/poll HTTP/1.1\r\n\r\n").await;
    assert!(reply.starts_with("HTTP/1.1 405 "));
}

#[tokio::test]
async fn upload_then_result_commits_and_ends_session() {
    let state = test_state();
    let (addr, handle) = start(Arc::clone(&state)).await;

    let image = vec![0x5Au8; 0x30000];
    let reply =
        send(addr, &post_multipart("/upload", &[("firmware", Some("fw.bin"), &image)])).await;
    assert!(body_of(&reply).starts_with("196608 "));

    let reply = send(addr, b"GET /result HTTP/1.1\r\n\r\n").await;
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(reply.ends_with("success"));

    // The image landed on the firmware partition.
    let target = state.pool.open(StorageSelect::Flash, "firmware").unwrap();
    let mut got = vec![0u8; image.len()];
    target.read(0, &mut got).unwrap();
    assert_eq!(got, image);

    // The session terminated with a reboot request.
    let outcome = handle.await.unwrap();
    assert!(matches!(outcome, SessionOutcome::Reboot));
}

#[tokio::test]
async fn result_without_upload_reports_failed() {
    let (addr, _handle) = start(test_state()).await;
    let reply = send(addr, b"GET /result HTTP/1.1\r\n\r\n").await;
    assert!(reply.ends_with("failed"));
}

#[tokio::test]
async fn unknown_path_gets_404_page() {
    let (addr, _handle) = start(test_state()).await;
    let reply = send(addr, b"GET /no/such/page HTTP/1.1\r\n\r\n").await;
    assert!(reply.starts_with("HTTP/1.1 404 "));
    assert!(reply.contains("Content-Type: text/html"));
}

#[tokio::test]
async fn index_is_served_at_aliases() {
    let (addr, _handle) = start(test_state()).await;
    for path in ["/", "/cgi-bin/luci", "/cgi-bin/luci/"] {
        let request = format!("GET {path} HTTP/1.1\r\n\r\n");
        let reply = send(addr, request.as_bytes()).await;
        assert!(reply.starts_with("HTTP/1.1 200 OK"), "{path}");
        assert!(body_of(&reply).contains("Failsafe Recovery"), "{path}");
    }
}

#[tokio::test]
async fn static_assets_have_mime_types() {
    let (addr, _handle) = start(test_state()).await;

    let reply = send(addr, b"GET /style.css HTTP/1.1\r\n\r\n").await;
    assert!(reply.contains("Content-Type: text/css"));

    let reply = send(addr, b"GET /main.js HTTP/1.1\r\n\r\n").await;
    assert!(reply.contains("Content-Type: text/javascript"));
}

#[tokio::test]
async fn unsupported_method_is_405() {
    let (addr, _handle) = start(test_state()).await;
    let reply = send(addr, b"DELETE /version HTTP/1.1\r\n\r\n").await;
    assert!(reply.starts_with("HTTP/1.1 405 "));
}

#[tokio::test]
async fn flash_write_persists_into_image_file() {
    use std::io::Write as _;

    use failsafe_core::storage::FileFlash;

    let mut image = tempfile::NamedTempFile::new().unwrap();
    image.write_all(&vec![0xFFu8; 0x20000]).unwrap();
    image.flush().unwrap();

    let state = test_state();
    let flash = Arc::new(FileFlash::open(image.path(), ERASE).unwrap());
    let parts = vec![Partition { name: "nvram".to_string(), offset: 0, size: 0x20000 }];
    let state = Arc::new(ServerState {
        pool: StoragePool::new().with_flash(flash, parts),
        env: Arc::clone(&state.env),
        console: Mutex::new(WebConsole::new(DEFAULT_RING_CAPACITY)),
        upload: Mutex::new(UploadSlot::new()),
        layouts: None,
        board: BoardInfo::default(),
        version: VERSION.to_string(),
        default_prompt: "FS> ".to_string(),
        validator: Box::new(AcceptAll),
        interpreter: Mutex::new(Box::new(ShellInterpreter::new(
            Arc::clone(&state.env),
            VERSION.to_string(),
        ))),
        control: SystemControl::default(),
    });
    let (addr, _handle) = start(state).await;

    let reply = send(
        addr,
        &post_form(
            "/flash/write",
            &[("target", "nvram"), ("start", "0x40"), ("data", "cafe")],
        ),
    )
    .await;
    assert_eq!(body_of(&reply), "{\"ok\":true,\"written\":2}\n");

    // The bytes are durable in the backing image file.
    let on_disk = std::fs::read(image.path()).unwrap();
    assert_eq!(&on_disk[0x40..0x42], &[0xca, 0xfe]);
    assert!(on_disk[..0x40].iter().all(|&b| b == 0xFF));
}

#[tokio::test]
async fn oversized_upload_is_413() {
    let state = test_state();
    let config = ServerConfig {
        bind: "127.0.0.1:0".to_string(),
        limits: ReadLimits { max_head: 16 * 1024, max_body: 1024 },
        dhcp: None,
    };
    let server = Server::bind(config, state).await.unwrap();
    let addr = server.local_addr().unwrap();
    let _handle = tokio::spawn(async move { server.run().await.unwrap() });

    let reply = send(addr, &post_multipart("/upload", &[("firmware", None, &[0u8; 4096])])).await;
    assert!(reply.starts_with("HTTP/1.1 413 "));
}
