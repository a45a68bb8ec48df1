//! Single-pass line classifier.
//!
//! Every line is evaluated against every rule of the pattern catalog once;
//! all matching rules fire, so one line may increment several counters.

use crate::catalog::{PATTERN_CATALOG, PatternRule};
use crate::storage::Increments;

/// Accumulates increments over the lines of one cycle.
pub struct Classifier {
    rules: &'static [PatternRule],
    increments: Increments,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier {
    /// Classifier over the built-in pattern catalog.
    pub fn new() -> Self {
        Self::with_rules(PATTERN_CATALOG)
    }

    pub fn with_rules(rules: &'static [PatternRule]) -> Self {
        Self {
            rules,
            increments: Increments::new(),
        }
    }

    pub fn observe(&mut self, line: &str) {
        for rule in self.rules {
            if (rule.predicate)(line) {
                for key in rule.targets {
                    self.increments.add(*key, 1);
                }
            }
        }
    }

    pub fn finish(self) -> Increments {
        self.increments
    }
}

/// Classifies a batch of lines in one pass.
pub fn classify<'a, I>(lines: I) -> Increments
where
    I: IntoIterator<Item = &'a str>,
{
    let mut classifier = Classifier::new();
    for line in lines {
        classifier.observe(line);
    }
    classifier.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CounterKey;

    const RECEIVED: &str =
        "Oct 19 10:00:00 mx postfix/smtpd[1234]: 4ABC123: client=mail.example.com[203.0.113.5]";
    const RBL_REJECT: &str = "Oct 19 10:00:01 mx postfix/smtpd[1234]: NOQUEUE: reject: RCPT from unknown[192.0.2.1]: 554 5.7.1 Service unavailable; Client host [192.0.2.1] blocked using zen.spamhaus.org; from=<a@example.net> to=<b@example.com> proto=ESMTP helo=<x>";

    #[test]
    fn test_single_received_line() {
        let inc = classify([RECEIVED]);

        assert_eq!(inc.get(CounterKey::MessagesReceived), 1);
        assert_eq!(inc.iter().count(), 1);
    }

    #[test]
    fn test_one_line_fires_generic_and_reason() {
        let inc = classify([RBL_REJECT]);

        assert_eq!(inc.get(CounterKey::MessagesRejected), 1);
        assert_eq!(inc.get(CounterKey::RejectRbl), 1);
    }

    #[test]
    fn test_counts_accumulate_across_lines() {
        let log = [
            "Oct 19 10:00:00 mx postfix/smtpd[1]: connect from unknown[192.0.2.9]",
            RECEIVED,
            "Oct 19 10:00:02 mx postfix/smtpd[1]: connect from mail.example.org[198.51.100.1]",
            RECEIVED,
            RBL_REJECT,
            "Oct 19 10:00:03 mx postfix/smtpd[1]: lost connection after RCPT from unknown[192.0.2.9]",
            "Oct 19 10:00:04 mx postfix/qmgr[2]: 4ABC123: removed",
        ];
        let inc = classify(log);

        assert_eq!(inc.get(CounterKey::SmtpdConnections), 2);
        assert_eq!(inc.get(CounterKey::MessagesReceived), 2);
        assert_eq!(inc.get(CounterKey::SmtpdLostConnections), 1);
        assert_eq!(inc.get(CounterKey::SmtpdNoqueue), 1);
        assert_eq!(inc.total(), 2 + 2 + 1 + 3);
    }

    #[test]
    fn test_split_batches_sum_to_whole() {
        let log = [
            RECEIVED,
            RBL_REJECT,
            "Oct 19 10:00:05 mx postfix/smtp[9]: 4ABC123: to=<x@example.org>, status=sent (250 OK)",
            RBL_REJECT,
        ];

        let whole = classify(log);
        let mut first = classify(log[..2].iter().copied());
        for (key, n) in classify(log[2..].iter().copied()).iter() {
            first.add(key, n);
        }

        assert_eq!(first, whole);
    }

    #[test]
    fn test_empty_batch() {
        assert!(classify(std::iter::empty()).is_empty());
    }

    #[test]
    fn test_custom_rules() {
        static RULES: &[PatternRule] = &[PatternRule {
            predicate: |l| l.starts_with('#'),
            targets: &[CounterKey::MessagesBounced, CounterKey::MessagesDeferred],
        }];
        let mut classifier = Classifier::with_rules(RULES);
        classifier.observe("# hello");
        classifier.observe("hello");
        let inc = classifier.finish();

        assert_eq!(inc.get(CounterKey::MessagesBounced), 1);
        assert_eq!(inc.get(CounterKey::MessagesDeferred), 1);
        assert_eq!(inc.total(), 2);
    }
}
