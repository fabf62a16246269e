//! All-or-nothing stream collection
//!
//! Streaming RPCs can fail after yielding some items. Tests want either the
//! complete ordered result or the failure, never a silently short list.

use std::future::Future;

use futures_util::{Stream, StreamExt};
use tonic::Status;

/// Drain `stream` into a vector in arrival order
///
/// The first error aborts collection and is returned unchanged; items
/// received before it are discarded.
pub async fn collect<T, E, S>(stream: S) -> Result<Vec<T>, E>
where
    S: Stream<Item = Result<T, E>>,
{
    futures_util::pin_mut!(stream);
    let mut items = Vec::new();

    while let Some(item) = stream.next().await {
        match item {
            Ok(item) => items.push(item),
            Err(e) => {
                tracing::debug!(received = items.len(), "Stream failed, discarding partial result");
                return Err(e);
            }
        }
    }

    Ok(items)
}

/// Await a streaming call and collect its responses
///
/// Covers both failure points: the call itself being rejected and the
/// stream failing part way.
pub async fn collect_call<T, S, F>(call: F) -> Result<Vec<T>, Status>
where
    F: Future<Output = Result<S, Status>>,
    S: Stream<Item = Result<T, Status>>,
{
    let stream = call.await?;
    collect(stream).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::proto::{Block, BlockHeader};
    use futures_util::stream;

    fn block(number: u64) -> Block {
        Block {
            header: Some(BlockHeader {
                number,
                ..Default::default()
            }),
            transactions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_collects_in_order() {
        let items = stream::iter(vec![Ok::<_, Status>(block(0)), Ok(block(1))]);
        let blocks = collect(items).await.unwrap();
        let numbers: Vec<_> = blocks.iter().filter_map(Block::number).collect();
        assert_eq!(numbers, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_empty_stream_is_empty_list() {
        let items = stream::iter(Vec::<Result<Block, Status>>::new());
        assert!(collect(items).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_after_items_discards_them() {
        let items = stream::iter(vec![
            Ok(block(3)),
            Ok(block(4)),
            Err(Status::out_of_range("block 5 not found")),
            Ok(block(5)),
        ]);
        let err = collect(items).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::OutOfRange);
        assert_eq!(err.message(), "block 5 not found");
    }

    #[tokio::test]
    async fn test_error_first_is_returned() {
        let items = stream::iter(vec![Err::<u32, _>("boom"), Ok(1)]);
        assert_eq!(collect(items).await, Err("boom"));
    }

    #[tokio::test]
    async fn test_collect_call_propagates_call_failure() {
        let call = async {
            Err::<stream::Iter<std::vec::IntoIter<Result<Block, Status>>>, _>(Status::invalid_argument(
                "chain not supported",
            ))
        };
        let err = collect_call(call).await.unwrap_err();
        assert_eq!(err.message(), "chain not supported");
    }

    #[tokio::test]
    async fn test_collect_call_collects_stream() {
        let call = async { Ok::<_, Status>(stream::iter(vec![Ok::<_, Status>(block(0)), Ok(block(1))])) };
        assert_eq!(collect_call(call).await.unwrap().len(), 2);
    }
}
