//! Metric catalog and log pattern table.
//!
//! Every exported counter has a `CounterKey`. Each `PatternRule` pairs a
//! line predicate with the keys it increments; the classifier evaluates all
//! rules against every line, so one line can fire several rules.

/// Exposition type of a metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

/// A metric family: one HELP/TYPE header, any number of labelled series.
#[derive(Debug, PartialEq, Eq)]
pub struct MetricFamily {
    /// Name without the configured prefix.
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
}

pub const QUEUE_SIZE: MetricFamily = MetricFamily {
    name: "queue_size",
    help: "Number of messages in a Postfix queue.",
    kind: MetricKind::Gauge,
};
pub const MESSAGES_RECEIVED: MetricFamily = MetricFamily {
    name: "messages_received_total",
    help: "Messages received by smtpd.",
    kind: MetricKind::Counter,
};
pub const MESSAGES_DELIVERED: MetricFamily = MetricFamily {
    name: "messages_delivered_total",
    help: "Delivery attempts that ended with status=sent.",
    kind: MetricKind::Counter,
};
pub const MESSAGES_DEFERRED: MetricFamily = MetricFamily {
    name: "messages_deferred_total",
    help: "Delivery attempts that ended with status=deferred.",
    kind: MetricKind::Counter,
};
pub const MESSAGES_BOUNCED: MetricFamily = MetricFamily {
    name: "messages_bounced_total",
    help: "Delivery attempts that ended with status=bounced.",
    kind: MetricKind::Counter,
};
pub const MESSAGES_REJECTED: MetricFamily = MetricFamily {
    name: "messages_rejected_total",
    help: "Messages rejected by smtpd.",
    kind: MetricKind::Counter,
};
pub const SMTPD_CONNECTIONS: MetricFamily = MetricFamily {
    name: "smtpd_connections_total",
    help: "Incoming smtpd connections.",
    kind: MetricKind::Counter,
};
pub const SMTPD_LOST_CONNECTIONS: MetricFamily = MetricFamily {
    name: "smtpd_lost_connections_total",
    help: "smtpd connections lost before the session finished.",
    kind: MetricKind::Counter,
};
pub const SMTPD_NOQUEUE: MetricFamily = MetricFamily {
    name: "smtpd_noqueue_total",
    help: "smtpd events logged before a queue id was assigned.",
    kind: MetricKind::Counter,
};
pub const SMTPD_SASL_AUTHENTICATED: MetricFamily = MetricFamily {
    name: "smtpd_sasl_authenticated_total",
    help: "Successful SASL authentications.",
    kind: MetricKind::Counter,
};
pub const SMTPD_SASL_FAILED: MetricFamily = MetricFamily {
    name: "smtpd_sasl_failed_total",
    help: "Failed SASL authentications.",
    kind: MetricKind::Counter,
};
pub const SMTPD_REJECT: MetricFamily = MetricFamily {
    name: "smtpd_reject_total",
    help: "smtpd rejections by reason.",
    kind: MetricKind::Counter,
};
pub const DELIVERY_STATUS: MetricFamily = MetricFamily {
    name: "delivery_status_total",
    help: "Delivery results by transport and status.",
    kind: MetricKind::Counter,
};
pub const MASTER_PROCESS_RUNNING: MetricFamily = MetricFamily {
    name: "master_process_running",
    help: "Whether the Postfix master process is running (1) or not (0).",
    kind: MetricKind::Gauge,
};
pub const MASTER_PROCESS_UPTIME: MetricFamily = MetricFamily {
    name: "master_process_uptime_seconds",
    help: "Seconds since the Postfix master process started.",
    kind: MetricKind::Counter,
};
pub const VERSION_INFO: MetricFamily = MetricFamily {
    name: "version_info",
    help: "Postfix version reported by postconf.",
    kind: MetricKind::Gauge,
};

/// Render order of the families in an exposition document.
pub const FAMILY_ORDER: &[&MetricFamily] = &[
    &QUEUE_SIZE,
    &MESSAGES_RECEIVED,
    &MESSAGES_DELIVERED,
    &MESSAGES_DEFERRED,
    &MESSAGES_BOUNCED,
    &MESSAGES_REJECTED,
    &SMTPD_CONNECTIONS,
    &SMTPD_LOST_CONNECTIONS,
    &SMTPD_NOQUEUE,
    &SMTPD_SASL_AUTHENTICATED,
    &SMTPD_SASL_FAILED,
    &SMTPD_REJECT,
    &DELIVERY_STATUS,
    &MASTER_PROCESS_RUNNING,
    &MASTER_PROCESS_UPTIME,
    &VERSION_INFO,
];

/// One persisted, log-derived counter series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CounterKey {
    MessagesReceived,
    MessagesDelivered,
    MessagesDeferred,
    MessagesBounced,
    MessagesRejected,
    SmtpdConnections,
    SmtpdLostConnections,
    SmtpdNoqueue,
    SmtpdSaslAuthenticated,
    SmtpdSaslFailed,
    RejectRbl,
    RejectHelo,
    RejectSender,
    RejectRecipient,
    RejectClient,
    RejectUnknownUser,
    DeliverySmtpSent,
    DeliveryLmtpSent,
    DeliveryVirtualSent,
    DeliveryPipeSent,
}

/// Family plus fixed label pairs of one exported series.
#[derive(Debug, Clone, Copy)]
pub struct Series {
    pub family: &'static MetricFamily,
    pub labels: &'static [(&'static str, &'static str)],
}

impl Series {
    const fn of(
        family: &'static MetricFamily,
        labels: &'static [(&'static str, &'static str)],
    ) -> Series {
        Series { family, labels }
    }
}

impl CounterKey {
    pub const COUNT: usize = 20;

    pub const ALL: [CounterKey; Self::COUNT] = [
        CounterKey::MessagesReceived,
        CounterKey::MessagesDelivered,
        CounterKey::MessagesDeferred,
        CounterKey::MessagesBounced,
        CounterKey::MessagesRejected,
        CounterKey::SmtpdConnections,
        CounterKey::SmtpdLostConnections,
        CounterKey::SmtpdNoqueue,
        CounterKey::SmtpdSaslAuthenticated,
        CounterKey::SmtpdSaslFailed,
        CounterKey::RejectRbl,
        CounterKey::RejectHelo,
        CounterKey::RejectSender,
        CounterKey::RejectRecipient,
        CounterKey::RejectClient,
        CounterKey::RejectUnknownUser,
        CounterKey::DeliverySmtpSent,
        CounterKey::DeliveryLmtpSent,
        CounterKey::DeliveryVirtualSent,
        CounterKey::DeliveryPipeSent,
    ];

    /// Key name used in the persisted state file.
    pub fn as_str(self) -> &'static str {
        match self {
            CounterKey::MessagesReceived => "messages_received",
            CounterKey::MessagesDelivered => "messages_delivered",
            CounterKey::MessagesDeferred => "messages_deferred",
            CounterKey::MessagesBounced => "messages_bounced",
            CounterKey::MessagesRejected => "messages_rejected",
            CounterKey::SmtpdConnections => "smtpd_connections",
            CounterKey::SmtpdLostConnections => "smtpd_lost_connections",
            CounterKey::SmtpdNoqueue => "smtpd_noqueue",
            CounterKey::SmtpdSaslAuthenticated => "smtpd_sasl_authenticated",
            CounterKey::SmtpdSaslFailed => "smtpd_sasl_failed",
            CounterKey::RejectRbl => "reject_rbl",
            CounterKey::RejectHelo => "reject_helo",
            CounterKey::RejectSender => "reject_sender",
            CounterKey::RejectRecipient => "reject_recipient",
            CounterKey::RejectClient => "reject_client",
            CounterKey::RejectUnknownUser => "reject_unknown_user",
            CounterKey::DeliverySmtpSent => "delivery_smtp_sent",
            CounterKey::DeliveryLmtpSent => "delivery_lmtp_sent",
            CounterKey::DeliveryVirtualSent => "delivery_virtual_sent",
            CounterKey::DeliveryPipeSent => "delivery_pipe_sent",
        }
    }

    pub fn from_name(name: &str) -> Option<CounterKey> {
        CounterKey::ALL.into_iter().find(|k| k.as_str() == name)
    }

    pub fn series(self) -> Series {
        match self {
            CounterKey::MessagesReceived => Series::of(&MESSAGES_RECEIVED, &[]),
            CounterKey::MessagesDelivered => Series::of(&MESSAGES_DELIVERED, &[]),
            CounterKey::MessagesDeferred => Series::of(&MESSAGES_DEFERRED, &[]),
            CounterKey::MessagesBounced => Series::of(&MESSAGES_BOUNCED, &[]),
            CounterKey::MessagesRejected => Series::of(&MESSAGES_REJECTED, &[]),
            CounterKey::SmtpdConnections => Series::of(&SMTPD_CONNECTIONS, &[]),
            CounterKey::SmtpdLostConnections => Series::of(&SMTPD_LOST_CONNECTIONS, &[]),
            CounterKey::SmtpdNoqueue => Series::of(&SMTPD_NOQUEUE, &[]),
            CounterKey::SmtpdSaslAuthenticated => Series::of(&SMTPD_SASL_AUTHENTICATED, &[]),
            CounterKey::SmtpdSaslFailed => Series::of(&SMTPD_SASL_FAILED, &[]),
            CounterKey::RejectRbl => Series::of(&SMTPD_REJECT, &[("reason", "rbl")]),
            CounterKey::RejectHelo => Series::of(&SMTPD_REJECT, &[("reason", "helo")]),
            CounterKey::RejectSender => Series::of(&SMTPD_REJECT, &[("reason", "sender")]),
            CounterKey::RejectRecipient => Series::of(&SMTPD_REJECT, &[("reason", "recipient")]),
            CounterKey::RejectClient => Series::of(&SMTPD_REJECT, &[("reason", "client")]),
            CounterKey::RejectUnknownUser => {
                Series::of(&SMTPD_REJECT, &[("reason", "unknown_user")])
            }
            CounterKey::DeliverySmtpSent => {
                Series::of(&DELIVERY_STATUS, &[("transport", "smtp"), ("status", "sent")])
            }
            CounterKey::DeliveryLmtpSent => {
                Series::of(&DELIVERY_STATUS, &[("transport", "lmtp"), ("status", "sent")])
            }
            CounterKey::DeliveryVirtualSent => {
                Series::of(&DELIVERY_STATUS, &[("transport", "virtual"), ("status", "sent")])
            }
            CounterKey::DeliveryPipeSent => {
                Series::of(&DELIVERY_STATUS, &[("transport", "pipe"), ("status", "sent")])
            }
        }
    }
}

/// A line predicate and the counters it increments.
pub struct PatternRule {
    pub predicate: fn(&str) -> bool,
    pub targets: &'static [CounterKey],
}

/// The static pattern table evaluated against every classified line.
///
/// Reject-reason predicates are mutually exclusive, so `smtpd_reject_total`
/// partitions rejections by reason. A ` blocked using ` hit is always `rbl`,
/// and `User unknown` is never `recipient`.
pub static PATTERN_CATALOG: &[PatternRule] = &[
    PatternRule {
        predicate: |l| is_smtpd(l) && l.contains(" client="),
        targets: &[CounterKey::MessagesReceived],
    },
    PatternRule {
        predicate: |l| is_postfix(l) && l.contains("status=sent"),
        targets: &[CounterKey::MessagesDelivered],
    },
    PatternRule {
        predicate: |l| is_postfix(l) && l.contains("status=deferred"),
        targets: &[CounterKey::MessagesDeferred],
    },
    PatternRule {
        predicate: |l| is_postfix(l) && l.contains("status=bounced"),
        targets: &[CounterKey::MessagesBounced],
    },
    PatternRule {
        predicate: is_reject,
        targets: &[CounterKey::MessagesRejected],
    },
    PatternRule {
        predicate: |l| is_smtpd(l) && l.contains(": connect from "),
        targets: &[CounterKey::SmtpdConnections],
    },
    PatternRule {
        predicate: |l| is_smtpd(l) && l.contains("lost connection after "),
        targets: &[CounterKey::SmtpdLostConnections],
    },
    PatternRule {
        predicate: |l| is_smtpd(l) && l.contains("NOQUEUE: "),
        targets: &[CounterKey::SmtpdNoqueue],
    },
    PatternRule {
        predicate: |l| is_smtpd(l) && l.contains("sasl_username="),
        targets: &[CounterKey::SmtpdSaslAuthenticated],
    },
    PatternRule {
        predicate: |l| is_smtpd(l) && l.contains("SASL ") && l.contains(" authentication failed"),
        targets: &[CounterKey::SmtpdSaslFailed],
    },
    PatternRule {
        predicate: |l| is_reject(l) && is_dnsbl(l),
        targets: &[CounterKey::RejectRbl],
    },
    PatternRule {
        predicate: |l| is_reject(l) && !is_dnsbl(l) && l.contains("Helo command rejected"),
        targets: &[CounterKey::RejectHelo],
    },
    PatternRule {
        predicate: |l| is_reject(l) && !is_dnsbl(l) && l.contains("Sender address rejected"),
        targets: &[CounterKey::RejectSender],
    },
    PatternRule {
        predicate: |l| {
            is_reject(l)
                && !is_dnsbl(l)
                && l.contains("Recipient address rejected")
                && !l.contains("User unknown")
        },
        targets: &[CounterKey::RejectRecipient],
    },
    PatternRule {
        predicate: |l| is_reject(l) && !is_dnsbl(l) && l.contains("Client host rejected"),
        targets: &[CounterKey::RejectClient],
    },
    PatternRule {
        predicate: |l| is_reject(l) && !is_dnsbl(l) && l.contains("User unknown"),
        targets: &[CounterKey::RejectUnknownUser],
    },
    PatternRule {
        predicate: |l| is_service(l, "/smtp[") && l.contains("status=sent"),
        targets: &[CounterKey::DeliverySmtpSent],
    },
    PatternRule {
        predicate: |l| is_service(l, "/lmtp[") && l.contains("status=sent"),
        targets: &[CounterKey::DeliveryLmtpSent],
    },
    PatternRule {
        predicate: |l| is_service(l, "/virtual[") && l.contains("status=sent"),
        targets: &[CounterKey::DeliveryVirtualSent],
    },
    PatternRule {
        predicate: |l| is_service(l, "/pipe[") && l.contains("status=sent"),
        targets: &[CounterKey::DeliveryPipeSent],
    },
];

fn is_postfix(line: &str) -> bool {
    line.contains("postfix/")
}

/// Service tag check: `postfix/smtpd[` but also `postfix/submission/smtpd[`.
fn is_service(line: &str, tag: &str) -> bool {
    match line.find("postfix/") {
        Some(pos) => line[pos..].contains(tag),
        None => false,
    }
}

fn is_smtpd(line: &str) -> bool {
    is_service(line, "/smtpd[")
}

fn is_reject(line: &str) -> bool {
    is_smtpd(line) && line.contains(" reject: ")
}

/// DNSBL and RHSBL hits. These take precedence over the address or host
/// reason their reply text also names.
fn is_dnsbl(line: &str) -> bool {
    line.contains(" blocked using ")
}
