//! Fuzz target for the DHCP packet codec.

#![no_main]

use std::net::Ipv4Addr;

use failsafe_server::dhcp::{DhcpConfig, handle_packet};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|packet: &[u8]| {
    let config = DhcpConfig {
        server_ip: Ipv4Addr::new(192, 168, 1, 1),
        netmask: Ipv4Addr::new(255, 255, 255, 0),
        lease_secs: 600,
    };
    if let Some(reply) = handle_packet(&config, packet) {
        assert!(reply.len() >= 300);
        assert_eq!(reply[0], 2);
    }
});
