use std::time::Duration;

use bastion::{
    mac::{Alg, MacEngine},
    stream::Stream,
    Error, Result,
};

use futures::io::BufReader;
use tokio_util::compat::TokioAsyncReadCompatExt;

const TIMEOUT: Duration = Duration::from_secs(3);

fn pair() -> (Stream<impl bastion::Pipe>, Stream<impl bastion::Pipe>) {
    let (client, server) = tokio::io::duplex(bastion::stream::PACKET_MAX_SIZE * 4);

    (
        Stream::new(BufReader::new(client.compat()), TIMEOUT),
        Stream::new(BufReader::new(server.compat()), TIMEOUT),
    )
}

fn engine(alg: Alg, key: u8) -> MacEngine {
    MacEngine::new(alg, &vec![key; alg.key_len()]).expect("keyable algorithm")
}

#[test_log::test(tokio::test)]
async fn roundtrips_in_the_clear() -> Result<()> {
    let (mut client, mut server) = pair();

    client.send(&[50, 1, 2, 3]).await?;
    client.send(&[5, 0, 0, 0, 4, b't', b'e', b's', b't']).await?;

    assert_eq!(server.recv().await?, [50, 1, 2, 3]);
    assert_eq!(server.recv().await?, [5, 0, 0, 0, 4, b't', b'e', b's', b't']);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn roundtrips_under_each_mac_family() -> Result<()> {
    for alg in [Alg::HmacSha256, Alg::HmacSha196, Alg::Umac64, Alg::Umac128] {
        let (mut client, mut server) = pair();

        // The usual handshake: in the clear until both directions are keyed.
        client.send(&[50, 1, 2, 3]).await?;
        assert_eq!(server.recv().await?, [50, 1, 2, 3]);

        server.with_mac(Some(engine(alg, 0xaa)), Some(engine(alg, 0xbb)));
        client.with_mac(Some(engine(alg, 0xbb)), Some(engine(alg, 0xaa)));

        client.send(&[50, 4, 5, 6]).await?;
        server.send(&[51, 7, 8, 9]).await?;

        assert_eq!(server.recv().await?, [50, 4, 5, 6]);
        assert_eq!(client.recv().await?, [51, 7, 8, 9]);
    }

    Ok(())
}

#[test_log::test(tokio::test)]
async fn rejects_a_tag_under_the_wrong_key() {
    let (mut client, mut server) = pair();

    client.with_mac(Some(engine(Alg::HmacSha256, 0x11)), None);
    server.with_mac(None, Some(engine(Alg::HmacSha256, 0x22)));

    client.send(&[50, 1, 2, 3]).await.expect("protected send");

    assert!(matches!(server.recv().await, Err(Error::Integrity(_))));
}

#[test_log::test(tokio::test)]
async fn surfaces_a_disconnect_error() {
    let (mut client, mut server) = pair();

    let error = client
        .disconnect(
            bastion::wire::DisconnectReason::ProtocolError,
            "unexpected message",
        )
        .await;
    assert!(matches!(error, Error::Disconnected(_)));

    let payload = server.recv().await.expect("disconnect frame");
    let mut reader = bastion::wire::PacketReader::new(&payload).expect("non-empty payload");
    assert_eq!(reader.message_id(), bastion::wire::msg::DISCONNECT);
}
