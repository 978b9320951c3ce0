//! DHCP responder exchange test over loopback UDP.
//!
//! The packet codec is covered by unit tests; this exercises the socket
//! path: a DISCOVER datagram in, an OFFER datagram back to the sender.

use std::net::Ipv4Addr;

use failsafe_server::dhcp::{DhcpConfig, DhcpServer, handle_packet};
use tokio::net::UdpSocket;

fn discover() -> Vec<u8> {
    let mut packet = vec![0u8; 236];
    packet[0] = 1; // BOOTREQUEST
    packet[1] = 1;
    packet[2] = 6;
    packet[4..8].copy_from_slice(&0xcafe_f00du32.to_be_bytes());
    packet[28..34].copy_from_slice(&[2, 0, 0, 0, 0, 1]);
    packet.extend_from_slice(&[0x63, 0x82, 0x53, 0x63]); // magic cookie
    packet.extend_from_slice(&[53, 1, 1]); // DHCPDISCOVER
    packet.push(255);
    packet
}

fn config() -> DhcpConfig {
    DhcpConfig {
        server_ip: Ipv4Addr::new(192, 168, 1, 1),
        netmask: Ipv4Addr::new(255, 255, 255, 0),
        lease_secs: 600,
    }
}

#[tokio::test]
async fn discover_is_answered_over_udp() {
    let server = DhcpServer::bind(config(), 0, 0).await.unwrap();
    let server_addr = server.local_addr().unwrap();
    let pump = tokio::spawn(async move {
        server.pump().await.unwrap();
    });

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(&discover(), ("127.0.0.1", server_addr.port()))
        .await
        .unwrap();

    let mut buf = [0u8; 1024];
    let (len, _from) =
        tokio::time::timeout(std::time::Duration::from_secs(5), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
    pump.await.unwrap();

    let reply = &buf[..len];
    assert_eq!(reply[0], 2, "BOOTREPLY");
    assert_eq!(&reply[4..8], &0xcafe_f00du32.to_be_bytes(), "xid echoed");
    assert_eq!(&reply[16..20], &[192, 168, 1, 2], "leased address");

    // The pure codec agrees with what went over the wire.
    let expected = handle_packet(&config(), &discover()).unwrap();
    assert_eq!(reply, expected);
}

#[tokio::test]
async fn junk_datagram_is_ignored_and_pump_survives() {
    let server = DhcpServer::bind(config(), 0, 0).await.unwrap();
    let server_addr = server.local_addr().unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(b"not dhcp", ("127.0.0.1", server_addr.port())).await.unwrap();
    // One pump consumes the junk without replying or failing.
    server.pump().await.unwrap();

    client.send_to(&discover(), ("127.0.0.1", server_addr.port())).await.unwrap();
    server.pump().await.unwrap();

    let mut buf = [0u8; 1024];
    let (len, _) =
        tokio::time::timeout(std::time::Duration::from_secs(5), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
    assert_eq!(buf[0], 2);
    assert!(len >= 300);
}
