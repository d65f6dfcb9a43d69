use futures::future::join_all;
use minirpc::codec::{BinaryCodec, CodecPair, CodecRegistry, read_message_body, write_message};
use minirpc::error::HandshakeError;
use minirpc::handshake::accept_option;
use minirpc::protocol::{CodecType, RpcHeader, RpcOption};
use minirpc_tokio_rpc_client::{RpcClient, RpcClientError, completion_queue};
use std::{sync::Arc, time::Duration};
use tokio::io::{AsyncReadExt, BufReader, duplex};
use tokio::time::{sleep, timeout};

/// Connects a client to a bare server-side codec the test drives by hand.
async fn connect() -> (RpcClient, CodecPair) {
    let registry = CodecRegistry::default();
    let (client_io, server_io) = duplex(64 * 1024);

    let client = RpcClient::new(client_io, None, &registry).await.unwrap();

    let mut server_io = BufReader::new(server_io);
    let option = accept_option(&mut server_io, &registry).await.unwrap();
    let server = registry.new_codec(&option.codec_type, server_io).unwrap();

    (client, server)
}

/// Reads one request, returning its header and string argument.
async fn read_request(server: &mut CodecPair) -> (RpcHeader, String) {
    let header = server.reader.read_header().await.unwrap();
    let args: String = read_message_body(&mut *server.reader).await.unwrap();
    (header, args)
}

#[tokio::test]
async fn test_sequence_numbers_follow_wire_order() {
    const CALLS: u64 = 32;

    let (client, mut server) = connect().await;

    let server_task = tokio::spawn(async move {
        let mut seen = Vec::new();
        for _ in 0..CALLS {
            let (header, args) = read_request(&mut server).await;
            seen.push(header.seq);
            write_message(&mut *server.writer, &header, &format!("echo {args}"))
                .await
                .unwrap();
        }
        seen
    });

    let calls = (0..CALLS).map(|i| {
        let client = &client;
        async move {
            let reply: String = client.call("Foo.Echo", &format!("req {i}")).await.unwrap();
            (i, reply)
        }
    });

    for (i, reply) in join_all(calls).await {
        assert_eq!(reply, format!("echo req {i}"));
    }

    let seen = server_task.await.unwrap();
    assert_eq!(seen, (1..=CALLS).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_responses_may_arrive_out_of_order() {
    let (client, mut server) = connect().await;

    let first = client.go::<_, String>("Foo.Sum", "a", None).await;
    let second = client.go::<_, String>("Foo.Sum", "b", None).await;
    let third = client.go::<_, String>("Foo.Sum", "c", None).await;
    assert_eq!((first.seq(), second.seq(), third.seq()), (1, 2, 3));

    let mut requests = Vec::new();
    for _ in 0..3 {
        requests.push(read_request(&mut server).await);
    }

    for (header, args) in requests.into_iter().rev() {
        write_message(&mut *server.writer, &header, &format!("resp {args}"))
            .await
            .unwrap();
    }

    let third = third.done().await.unwrap();
    assert_eq!(third.seq, 3);
    assert_eq!(third.into_result().unwrap(), "resp c");

    let first = first.done().await.unwrap();
    assert_eq!(first.service_method, "Foo.Sum");
    assert_eq!(first.into_result().unwrap(), "resp a");

    assert_eq!(second.done().await.unwrap().into_result().unwrap(), "resp b");
}

#[tokio::test]
async fn test_remote_error_completes_only_its_call() {
    let (client, mut server) = connect().await;

    let failing = client.go::<_, String>("Foo.Fail", "x", None).await;
    let (mut header, _) = read_request(&mut server).await;
    header.error = "boom".to_owned();
    write_message(&mut *server.writer, &header, &()).await.unwrap();

    let call = failing.done().await.unwrap();
    assert!(matches!(call.error(), Some(RpcClientError::Remote(msg)) if msg == "boom"));
    assert_eq!(call.error().unwrap().to_string(), "boom");

    let server_task = tokio::spawn(async move {
        let (header, args) = read_request(&mut server).await;
        write_message(&mut *server.writer, &header, &args).await.unwrap();
        server
    });

    let reply: String = client.call("Foo.Echo", "still alive").await.unwrap();
    assert_eq!(reply, "still alive");
    assert!(client.is_available());

    drop(server_task.await.unwrap());
}

#[tokio::test]
async fn test_response_for_unknown_sequence_is_discarded() {
    let (client, mut server) = connect().await;

    let server_task = tokio::spawn(async move {
        let (header, _) = read_request(&mut server).await;

        let stray = RpcHeader::new(header.service_method.clone(), 999);
        write_message(&mut *server.writer, &stray, &vec![0u8; 64])
            .await
            .unwrap();
        write_message(&mut *server.writer, &header, "the real one")
            .await
            .unwrap();
        server
    });

    let reply: String = client.call("Foo.Sum", "x").await.unwrap();
    assert_eq!(reply, "the real one");

    drop(server_task.await.unwrap());
}

#[tokio::test]
async fn test_undecodable_reply_does_not_poison_the_connection() {
    let (client, mut server) = connect().await;

    let server_task = tokio::spawn(async move {
        // An empty body cannot be decoded as a `String`.
        let (header, _) = read_request(&mut server).await;
        server.writer.write(&header, &[]).await.unwrap();

        let (header, args) = read_request(&mut server).await;
        write_message(&mut *server.writer, &header, &args).await.unwrap();
        server
    });

    let result = client.call::<_, String>("Foo.Sum", "first").await;
    match result {
        Err(RpcClientError::ReadBody(msg)) => assert!(!msg.is_empty()),
        other => panic!("expected a body error, got {other:?}"),
    }

    let reply: String = client.call("Foo.Sum", "second").await.unwrap();
    assert_eq!(reply, "second");

    drop(server_task.await.unwrap());
}

#[tokio::test]
async fn test_close_completes_pending_calls_with_shutdown() {
    let (client, mut server) = connect().await;

    let (done, mut completed) = completion_queue::<String>(4).unwrap();
    for i in 0..3 {
        client
            .go("Foo.Slow", &format!("req {i}"), Some(done.clone()))
            .await;
    }
    drop(done);
    for _ in 0..3 {
        read_request(&mut server).await;
    }

    assert!(client.is_available());
    client.close().await.unwrap();
    assert!(!client.is_available());

    let mut seqs = Vec::new();
    while let Some(call) = completed.recv().await {
        assert!(matches!(call.result, Err(RpcClientError::Shutdown)));
        seqs.push(call.seq);
    }
    seqs.sort_unstable();
    assert_eq!(seqs, vec![1, 2, 3]);

    // Only the first close has an effect.
    assert!(matches!(client.close().await, Err(RpcClientError::Shutdown)));

    // New calls are refused without consuming a sequence number.
    let refused = client.go::<_, String>("Foo.Sum", "late", None).await;
    assert_eq!(refused.seq(), 0);
    let call = refused.done().await.unwrap();
    assert_eq!(call.error().unwrap().to_string(), "connection is shut down");

    // The server sees the client's side of the stream end.
    assert!(server.reader.read_header().await.unwrap_err().is_eof());
}

#[tokio::test]
async fn test_server_eof_fails_every_pending_call() {
    let (client, mut server) = connect().await;

    let (done, mut completed) = completion_queue::<String>(8).unwrap();
    for i in 0..3 {
        client
            .go("Foo.Sum", &format!("req {i}"), Some(done.clone()))
            .await;
    }
    drop(done);

    for _ in 0..3 {
        read_request(&mut server).await;
    }
    drop(server);

    let mut seqs = Vec::new();
    while let Some(call) = completed.recv().await {
        match &call.result {
            Err(RpcClientError::Connection(err)) => assert!(err.is_eof()),
            other => panic!("expected a connection error, got {other:?}"),
        }
        assert!(call.result.as_ref().unwrap_err().is_shutdown());
        seqs.push(call.seq);
    }

    seqs.sort_unstable();
    assert_eq!(seqs, vec![1, 2, 3]);
    assert!(!client.is_available());

    let result = client.call::<_, String>("Foo.Sum", "after").await;
    assert!(matches!(result, Err(RpcClientError::Shutdown)));
}

#[tokio::test]
async fn test_calls_can_share_a_completion_queue() {
    let (client, mut server) = connect().await;

    let (done, mut completed) = completion_queue::<String>(4).unwrap();

    let mut handles = Vec::new();
    for name in ["a", "b", "c"] {
        handles.push(client.go("Foo.Echo", name, Some(done.clone())).await);
    }

    for _ in 0..3 {
        let (header, args) = read_request(&mut server).await;
        write_message(&mut *server.writer, &header, &args).await.unwrap();
    }

    let mut replies = Vec::new();
    for _ in 0..3 {
        let call = completed.recv().await.unwrap();
        replies.push((call.seq, call.into_result().unwrap()));
    }
    replies.sort();
    assert_eq!(
        replies,
        vec![
            (1, "a".to_owned()),
            (2, "b".to_owned()),
            (3, "c".to_owned())
        ]
    );

    // Handles for calls with a caller-supplied queue only identify the call.
    for handle in handles {
        assert!(handle.done().await.is_none());
    }
}

#[tokio::test]
async fn test_full_shared_queue_still_receives_every_completion() {
    let (client, mut server) = connect().await;

    let (done, mut completed) = completion_queue::<String>(1).unwrap();
    for name in ["a", "b", "c"] {
        client.go("Foo.Echo", name, Some(done.clone())).await;
    }
    drop(done);

    for _ in 0..3 {
        let (header, args) = read_request(&mut server).await;
        write_message(&mut *server.writer, &header, &args).await.unwrap();
    }

    // Give the receive loop time to fill the queue before anything is drained.
    sleep(Duration::from_millis(50)).await;

    let mut replies = Vec::new();
    while let Some(call) = timeout(Duration::from_secs(2), completed.recv())
        .await
        .unwrap()
    {
        replies.push(call.into_result().unwrap());
    }
    replies.sort();
    assert_eq!(replies, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_close_abandons_a_blocked_write() {
    let registry = CodecRegistry::default();
    let (client_io, server_io) = duplex(128);

    let client = Arc::new(RpcClient::new(client_io, None, &registry).await.unwrap());

    // The server reads the option record and nothing else, so the request
    // below fills the stream and the write stalls.
    let mut server_io = BufReader::new(server_io);
    accept_option(&mut server_io, &registry).await.unwrap();

    let caller = client.clone();
    let blocked = tokio::spawn(async move {
        caller
            .go::<_, String>("Foo.Big", &vec![7u8; 64 * 1024], None)
            .await
            .done()
            .await
    });
    sleep(Duration::from_millis(50)).await;

    timeout(Duration::from_secs(2), client.close())
        .await
        .expect("close stalled behind the write")
        .unwrap();

    let call = timeout(Duration::from_secs(2), blocked)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(call.seq, 1);
    assert!(matches!(call.result, Err(RpcClientError::Shutdown)));
    assert!(!client.is_available());

    drop(server_io);
}

#[tokio::test]
async fn test_write_failure_completes_only_the_failed_call() {
    // Requests and responses travel on separate streams so the request side
    // can fail while responses keep flowing.
    let (requests_io, requests_peer) = duplex(64 * 1024);
    let (responses_io, responses_peer) = duplex(64 * 1024);

    let client = RpcClient::from_codec(
        CodecPair {
            reader: BinaryCodec::new_pair(Box::new(responses_io)).reader,
            writer: BinaryCodec::new_pair(Box::new(requests_io)).writer,
        },
        RpcOption::default(),
    );
    let mut requests = BinaryCodec::new_pair(Box::new(requests_peer));
    let mut responses = BinaryCodec::new_pair(Box::new(responses_peer));

    let first = client.go::<_, String>("Foo.Sum", "first", None).await;
    let (first_header, _) = read_request(&mut requests).await;
    assert_eq!(first_header.seq, 1);

    drop(requests);

    let result = client.call::<_, String>("Foo.Sum", "second").await;
    match result {
        Err(RpcClientError::Send(err)) => assert!(!err.is_eof()),
        other => panic!("expected a send error, got {other:?}"),
    }

    // A late response for the failed call is discarded and the stream stays
    // aligned for the call still in flight.
    write_message(&mut *responses.writer, &RpcHeader::new("Foo.Sum", 2), "stray")
        .await
        .unwrap();
    write_message(&mut *responses.writer, &first_header, "reply")
        .await
        .unwrap();

    let first = first.done().await.unwrap();
    assert_eq!(first.into_result().unwrap(), "reply");
}

#[test]
fn test_zero_capacity_queue_is_rejected() {
    assert!(matches!(
        completion_queue::<String>(0),
        Err(RpcClientError::UnbufferedCompletionQueue)
    ));
    assert!(completion_queue::<String>(1).is_ok());
}

#[tokio::test]
async fn test_dropping_the_client_completes_pending_calls() {
    let (client, mut server) = connect().await;

    let (done, mut completed) = completion_queue::<String>(1).unwrap();
    client.go("Foo.Slow", "x", Some(done)).await;
    let _ = read_request(&mut server).await;

    drop(client);

    let call = completed.recv().await.unwrap();
    assert!(matches!(call.result, Err(RpcClientError::Shutdown)));
}

#[tokio::test]
async fn test_unsupported_codec_is_rejected_before_writing() {
    let registry = CodecRegistry::default();
    let (client_io, mut server_io) = duplex(1024);

    let result = RpcClient::new(client_io, Some(RpcOption::new(CodecType::Json)), &registry).await;
    assert!(matches!(
        result,
        Err(HandshakeError::UnsupportedCodec(CodecType::Json))
    ));

    let mut raw = Vec::new();
    server_io.read_to_end(&mut raw).await.unwrap();
    assert!(raw.is_empty());
}

#[tokio::test]
async fn test_dial_fails_when_nothing_listens() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = RpcClient::dial(addr, None, &CodecRegistry::default()).await;
    assert!(matches!(result, Err(HandshakeError::Io(_))));
}
