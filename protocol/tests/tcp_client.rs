//! TCP client against an in-process block node server.

use blockfeed_protocol::codec::{read_frame, write_frame, MAX_MESSAGE_SIZE};
use blockfeed_protocol::version::is_compatible;
use blockfeed_protocol::{
    BlockNodeClient, ProtocolError, Request, RequestFrame, Response, ServerStatusResponse,
    StreamStatus, SubscribeStreamResponse, TcpBlockNodeClient,
};
use blockfeed_types::{BlockItem, BlockItemSet, RoundHeader};
use futures_util::StreamExt;
use tokio::net::TcpListener;

/// Serves blocks `first..=last`, one round header per item set, then `Success`.
async fn spawn_server(first: u64, last: u64) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let Ok(Some(frame)) = read_frame::<_, RequestFrame>(&mut socket, MAX_MESSAGE_SIZE).await
                else {
                    return;
                };
                if !is_compatible(frame.version) {
                    let _ = write_frame(&mut socket, &Response::Rejected("version".into())).await;
                    return;
                }
                match frame.request {
                    Request::ServerStatus => {
                        let status = ServerStatusResponse {
                            first_available_block: first,
                            last_available_block: last,
                        };
                        let _ = write_frame(&mut socket, &Response::ServerStatus(status)).await;
                    }
                    Request::Subscribe(request) => {
                        let end = request.end_block_number.unwrap_or(last).min(last);
                        for n in request.start_block_number..=end {
                            let set = BlockItemSet {
                                items: vec![BlockItem::RoundHeader(RoundHeader { round_number: n })],
                            };
                            let response = Response::Stream(SubscribeStreamResponse::BlockItems(set));
                            if write_frame(&mut socket, &response).await.is_err() {
                                return;
                            }
                        }
                        let done = Response::Stream(SubscribeStreamResponse::Status(StreamStatus::Success));
                        let _ = write_frame(&mut socket, &done).await;
                    }
                }
            });
        }
    });

    addr
}

#[tokio::test]
async fn status_reports_available_range() {
    let addr = spawn_server(3, 9).await;
    let client = TcpBlockNodeClient::new(addr);
    let status = client.server_status().await.unwrap();
    assert_eq!(status.first_available_block, 3);
    assert_eq!(status.last_available_block, 9);
}

#[tokio::test]
async fn subscription_delivers_items_then_status() {
    let addr = spawn_server(0, 4).await;
    let client = TcpBlockNodeClient::new(addr).with_response_buffer(2);
    let request = blockfeed_protocol::SubscribeStreamRequest {
        start_block_number: 2,
        end_block_number: None,
    };

    let responses: Vec<_> = client
        .subscribe(request)
        .await
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
        .await;

    assert_eq!(responses.len(), 4);
    let rounds: Vec<u64> = responses[..3]
        .iter()
        .map(|r| match r {
            SubscribeStreamResponse::BlockItems(set) => match &set.items[0] {
                BlockItem::RoundHeader(h) => h.round_number,
                other => panic!("unexpected item {other:?}"),
            },
            other => panic!("unexpected response {other:?}"),
        })
        .collect();
    assert_eq!(rounds, vec![2, 3, 4]);
    assert_eq!(
        responses[3],
        SubscribeStreamResponse::Status(StreamStatus::Success)
    );
}

#[tokio::test]
async fn dropping_subscription_is_clean() {
    let addr = spawn_server(0, 1_000).await;
    let client = TcpBlockNodeClient::new(addr).with_response_buffer(1);
    let mut stream = client
        .subscribe(blockfeed_protocol::SubscribeStreamRequest {
            start_block_number: 0,
            end_block_number: None,
        })
        .await
        .unwrap();
    assert!(stream.next().await.unwrap().is_ok());
    drop(stream);
}

#[tokio::test]
async fn unreachable_endpoint_is_an_error() {
    // bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let client = TcpBlockNodeClient::new(addr);
    let err = client.server_status().await.unwrap_err();
    assert!(matches!(err, ProtocolError::Io(_) | ProtocolError::Timeout(_)));
}
