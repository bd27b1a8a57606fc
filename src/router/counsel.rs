//! Counsel-mode aggregators: dispatch the same query to several backends
//! concurrently and combine their answers. Only `race` and `vote` are
//! required; `merge` is optional per spec and is not implemented here.

use futures::future::select_all;

use crate::external::llm::Token;

/// First backend to produce any token wins; the rest are drained
/// asynchronously (their output discarded) so their streams still release
/// cleanly on the backend side.
///
/// Returns `None` if `receivers` is empty or every receiver closed without
/// producing a token.
pub async fn race(mut receivers: Vec<flume::Receiver<Token>>) -> Option<flume::Receiver<Token>> {
    if receivers.is_empty() {
        return None;
    }
    let futs: Vec<_> = receivers.iter().map(|r| Box::pin(r.recv_async())).collect();
    let (result, winner_index, _still_pending) = select_all(futs).await;

    for (i, rx) in receivers.iter().enumerate() {
        if i != winner_index {
            let rx = rx.clone();
            tokio::spawn(async move { while rx.recv_async().await.is_ok() {} });
        }
    }

    let first_token = result.ok()?;
    let winner_rx = receivers.swap_remove(winner_index);
    let (tx, out_rx) = flume::unbounded();
    let _ = tx.send(first_token);
    tokio::spawn(async move {
        while let Ok(token) = winner_rx.recv_async().await {
            if tx.send(token).is_err() {
                break;
            }
        }
    });
    Some(out_rx)
}

/// Wait for every backend to finish, concatenate each into a single
/// response, group responses by `equivalent`, and return a representative
/// of the largest group. Ties are broken by whichever group was seen first.
pub async fn vote<E>(receivers: Vec<flume::Receiver<Token>>, equivalent: E) -> Option<String>
where
    E: Fn(&str, &str) -> bool,
{
    if receivers.is_empty() {
        return None;
    }
    let mut responses = Vec::with_capacity(receivers.len());
    for rx in receivers {
        let mut text = String::new();
        while let Ok(token) = rx.recv_async().await {
            if token.is_final {
                break;
            }
            text.push_str(&token.text);
        }
        responses.push(text);
    }

    let mut groups: Vec<(String, usize)> = Vec::new();
    for response in &responses {
        if let Some(group) = groups.iter_mut().find(|(rep, _)| equivalent(rep, response)) {
            group.1 += 1;
        } else {
            groups.push((response.clone(), 1));
        }
    }
    groups.into_iter().max_by_key(|(_, count)| *count).map(|(rep, _)| rep)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens_channel(words: &[&str]) -> flume::Receiver<Token> {
        let (tx, rx) = flume::unbounded();
        for w in words {
            tx.send(Token::chunk(*w)).unwrap();
        }
        tx.send(Token::end()).unwrap();
        rx
    }

    #[tokio::test]
    async fn vote_picks_majority() {
        let receivers = vec![
            tokens_channel(&["yes"]),
            tokens_channel(&["yes"]),
            tokens_channel(&["no"]),
        ];
        let winner = vote(receivers, |a, b| a == b).await;
        assert_eq!(winner, Some("yes".to_string()));
    }

    #[tokio::test]
    async fn race_returns_a_stream_from_one_backend() {
        let receivers = vec![tokens_channel(&["a", "b"]), tokens_channel(&["c", "d"])];
        let winner = race(receivers).await.expect("at least one token");
        let mut collected = String::new();
        while let Ok(token) = winner.recv_async().await {
            if token.is_final {
                break;
            }
            collected.push_str(&token.text);
        }
        assert!(collected == "ab" || collected == "cd");
    }
}
