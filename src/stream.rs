use std::time::Duration;

use alloy::rpc::client::RpcClient;
use futures::{Stream, stream};

use crate::{error::SessionError, rpc, types::Commitment};

/// Returns stream of slots observed by the node, one item per new slot
/// seen at a poll.
///
/// Polls `getSlot` via the given [`RpcClient`] every `interval`, sleeping
/// with the provided `sleep` function. Polls that return the last seen slot
/// produce no item; failed polls produce an error item and the stream
/// carries on.
pub fn slots<S, SFut>(
    client: RpcClient,
    commitment: Commitment,
    interval: Duration,
    sleep: S,
) -> impl Stream<Item = Result<u64, SessionError>>
where
    S: Fn(Duration) -> SFut + Copy,
    SFut: Future<Output = ()>,
{
    stream::unfold((client, None), move |(client, last)| async move {
        loop {
            sleep(interval).await;
            match rpc::get_slot(&client, commitment).await {
                Ok(slot) if Some(slot) == last => continue,
                Ok(slot) => return Some((Ok(slot), (client, Some(slot)))),
                Err(e) => return Some((Err(e), (client, last))),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    #[ignore = "requires access to Solana devnet"]
    async fn test_stream_devnet_slots() {
        let client = RpcClient::new_http("https://api.devnet.solana.com".parse().unwrap());
        let stream = slots(
            client,
            Commitment::Confirmed,
            Duration::from_millis(400),
            tokio::time::sleep,
        );
        let results = stream.take(5).collect::<Vec<_>>().await;

        let slots: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(slots.len(), 5);
        assert!(slots.windows(2).all(|w| w[0] < w[1]), "{slots:?}");
    }
}
