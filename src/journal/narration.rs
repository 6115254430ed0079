use std::sync::Arc;

/// What happened, with everything a narration template needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrationEvent<'a> {
    Joined {
        username: &'a str,
        club_name: &'a str,
    },
    Left {
        username: &'a str,
        club_name: &'a str,
    },
    Scored {
        username: &'a str,
        delta: i64,
        action: &'a str,
    },
}

/// Turns journal events into the system messages posted to club chat.
pub trait Narrator: Send + Sync {
    fn narrate(&self, event: &NarrationEvent<'_>) -> String;
}

impl<F> Narrator for F
where
    F: Fn(&NarrationEvent<'_>) -> String + Send + Sync,
{
    fn narrate(&self, event: &NarrationEvent<'_>) -> String {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNarrator;

impl Narrator for DefaultNarrator {
    fn narrate(&self, event: &NarrationEvent<'_>) -> String {
        match event {
            NarrationEvent::Joined {
                username,
                club_name,
            } => format!("{username} has joined {club_name}."),
            NarrationEvent::Left {
                username,
                club_name,
            } => format!("{username} has left {club_name}."),
            NarrationEvent::Scored {
                username,
                delta,
                action,
            } => format!("{username} increased their count by {delta} {action}"),
        }
    }
}

pub type DynNarrator = Arc<dyn Narrator>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_templates() {
        let n = DefaultNarrator;
        assert_eq!(
            n.narrate(&NarrationEvent::Joined {
                username: "alice",
                club_name: "Readers"
            }),
            "alice has joined Readers."
        );
        assert_eq!(
            n.narrate(&NarrationEvent::Left {
                username: "alice",
                club_name: "Readers"
            }),
            "alice has left Readers."
        );
        assert_eq!(
            n.narrate(&NarrationEvent::Scored {
                username: "alice",
                delta: 10,
                action: "pages read"
            }),
            "alice increased their count by 10 pages read"
        );
    }

    #[test]
    fn closures_are_narrators() {
        let shout: DynNarrator = Arc::new(|event: &NarrationEvent<'_>| match event {
            NarrationEvent::Scored { username, .. } => format!("{} SCORED", username.to_uppercase()),
            _ => String::from("-"),
        });
        let text = shout.narrate(&NarrationEvent::Scored {
            username: "bob",
            delta: 1,
            action: "km",
        });
        assert_eq!(text, "BOB SCORED");
    }
}
