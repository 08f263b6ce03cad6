use crossbeam_channel::unbounded;
use transport::{TransportError, TransportResult};

use crate::endpoint::FabricEndpoint;

/// Builds a fully connected fabric of `processes` endpoints.
///
/// The endpoint at index `i` has rank `i`. No endpoint can address itself.
pub fn build_fabric(processes: usize) -> TransportResult<Vec<FabricEndpoint>> {
    if processes == 0 {
        return Err(TransportError::InvalidConfig(
            "a fabric needs at least one process",
        ));
    }

    let (senders, inboxes): (Vec<_>, Vec<_>) = (0..processes).map(|_| unbounded()).unzip();

    let endpoints = inboxes
        .into_iter()
        .enumerate()
        .map(|(rank, inbox)| {
            let peers = senders
                .iter()
                .enumerate()
                .map(|(peer, sender)| (peer != rank).then(|| sender.clone()))
                .collect();
            FabricEndpoint::new(rank, peers, inbox)
        })
        .collect();

    tracing::debug!(processes, "fabric built");
    Ok(endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use transport::Transport;

    #[test]
    fn rejects_empty_fabric() {
        assert!(matches!(
            build_fabric(0),
            Err(TransportError::InvalidConfig(_))
        ));
    }

    #[test]
    fn ranks_follow_index() {
        let endpoints = build_fabric(3).unwrap();
        for (index, endpoint) in endpoints.iter().enumerate() {
            assert_eq!(endpoint.my_rank(), index);
            assert_eq!(endpoint.process_count(), 3);
        }
    }

    #[test]
    fn single_process_fabric_has_no_peers() {
        let endpoints = build_fabric(1).unwrap();
        assert!(matches!(
            endpoints[0].send(0, vec![1]),
            Err(TransportError::Loopback(0))
        ));
        // Nobody can ever write to the inbox.
        assert!(matches!(
            endpoints[0].receive(),
            Err(TransportError::Disconnected(0))
        ));
    }
}
