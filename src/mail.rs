use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use tracing::info;

const OUTBOX_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub link: String,
}

/// Development mailer: logs each mail and keeps the most recent ones in memory.
#[derive(Clone, Default)]
pub struct Mailer {
    outbox: Arc<Mutex<VecDeque<Mail>>>,
}

impl Mailer {
    pub fn send(&self, mail: Mail) {
        info!(to = %mail.to, subject = %mail.subject, link = %mail.link, "mail sent");

        let mut outbox = self.outbox.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if outbox.len() == OUTBOX_LIMIT {
            outbox.pop_front();
        }
        outbox.push_back(mail);
    }

    /// Most recent mail addressed to `to`.
    pub fn last_to(&self, to: &str) -> Option<Mail> {
        let outbox = self.outbox.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        outbox.iter().rev().find(|mail| mail.to == to).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(to: &str, link: &str) -> Mail {
        Mail {
            to: to.to_owned(),
            subject: "Confirm your signup".to_owned(),
            link: link.to_owned(),
        }
    }

    #[test]
    fn last_to_finds_newest_mail_for_recipient() {
        let mailer = Mailer::default();
        mailer.send(mail("a@x.org", "one"));
        mailer.send(mail("b@x.org", "two"));
        mailer.send(mail("a@x.org", "three"));

        assert_eq!(mailer.last_to("a@x.org").unwrap().link, "three");
        assert!(mailer.last_to("c@x.org").is_none());
    }

    #[test]
    fn outbox_is_bounded() {
        let mailer = Mailer::default();
        for i in 0..=OUTBOX_LIMIT {
            mailer.send(mail(&format!("{i}@x.org"), "link"));
        }
        assert!(mailer.last_to("0@x.org").is_none());
        assert!(mailer.last_to(&format!("{OUTBOX_LIMIT}@x.org")).is_some());
    }
}
