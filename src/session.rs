//! Client session descriptors and the session factory.

use std::fmt;
use std::process;

use rand::Rng;

/// Which side of the broker a harness exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Publisher,
    Subscriber,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Publisher => "publisher",
            Role::Subscriber => "subscriber",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state of one session, driven by its network-event driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// One logical client identity: a unique ID and the topic it works against.
///
/// Sessions are owned by the harness that created them; each worker gets
/// exactly one and never shares it.
#[derive(Debug, Clone)]
pub struct ClientSession {
    pub id: String,
    pub topic: String,
    pub index: usize,
}

/// Build exactly `count` session descriptors for `role`.
///
/// IDs are globally unique across concurrent harness processes (they embed
/// the pid and a random salt). Publisher topics are derived from the index
/// as `{base}/publisher_{index}`; subscribers all use `topic` as-is, which
/// is expected to be a filter covering the publisher topics.
///
/// `count == 0` yields an empty set, which callers treat as a no-op run.
pub fn build_sessions(role: Role, count: usize, topic: &str) -> Vec<ClientSession> {
    let pid = process::id();
    let mut rng = rand::thread_rng();

    (1..=count)
        .map(|index| {
            let salt: u32 = rng.gen_range(1000..10000);
            ClientSession {
                id: format!("{role}-{index}-{pid}-{salt}"),
                topic: match role {
                    Role::Publisher => format!("{topic}/publisher_{index}"),
                    Role::Subscriber => topic.to_string(),
                },
                index,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_factory_produces_unique_ids_and_indexed_topics() {
        let sessions = build_sessions(Role::Publisher, 5, "multi_client/test");
        assert_eq!(sessions.len(), 5);

        let ids: HashSet<_> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids.len(), 5);

        for (i, session) in sessions.iter().enumerate() {
            assert_eq!(session.index, i + 1);
            assert_eq!(
                session.topic,
                format!("multi_client/test/publisher_{}", i + 1)
            );
            assert!(session.id.starts_with("publisher-"));
        }
    }

    #[test]
    fn test_factory_zero_count_is_a_noop() {
        assert!(build_sessions(Role::Publisher, 0, "t").is_empty());
    }

    #[test]
    fn test_subscribers_share_the_filter_topic() {
        let sessions = build_sessions(Role::Subscriber, 3, "multi_client/#");
        assert!(sessions.iter().all(|s| s.topic == "multi_client/#"));
    }
}
