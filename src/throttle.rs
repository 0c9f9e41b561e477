//! Component C: the throttler facade.
//!
//! The core only depends on the `Throttler` trait; `RuleThrottler` is
//! a minimal reference rule set so the crate is runnable standalone.
//! Operators are expected to supply their own `Throttler` backed by
//! whatever rule engine they run in production.

use std::collections::HashMap;

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleResult {
    Accept,
    FakeAccept,
    Reject,
    Defer,
}

impl ThrottleResult {
    /// The numeric "depth" stamped into minted crash ids. Preserves
    /// whatever scheme the throttler hands back; this reference
    /// implementation uses 0 for accept-like outcomes and 1 for defer.
    pub fn mint_depth(&self) -> u8 {
        match self {
            ThrottleResult::Accept | ThrottleResult::FakeAccept => 0,
            ThrottleResult::Defer => 1,
            ThrottleResult::Reject => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThrottleResult::Accept => "accept",
            ThrottleResult::FakeAccept => "fakeaccept",
            ThrottleResult::Reject => "reject",
            ThrottleResult::Defer => "defer",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThrottleDecision {
    pub result: ThrottleResult,
    pub rule_name: String,
    pub rate: f64,
}

pub trait Throttler: Send + Sync {
    fn throttle(&self, annotations: &HashMap<String, String>) -> ThrottleDecision;
}

/// A rule is a simple predicate over annotations; the first rule to
/// match wins. If none match, the default sampler decides.
pub struct Rule {
    pub name: String,
    pub matches: Box<dyn Fn(&HashMap<String, String>) -> bool + Send + Sync>,
    pub result: ThrottleResult,
    pub rate: f64,
}

pub struct RuleThrottler {
    rules: Vec<Rule>,
    default_rate: f64,
}

impl RuleThrottler {
    pub fn new(rules: Vec<Rule>, default_rate: f64) -> Self {
        RuleThrottler { rules, default_rate }
    }

    /// The trivial throttler used when no rules are configured:
    /// accept everything at rate 1.0.
    pub fn accept_all() -> Self {
        RuleThrottler {
            rules: Vec::new(),
            default_rate: 1.0,
        }
    }
}

impl Throttler for RuleThrottler {
    fn throttle(&self, annotations: &HashMap<String, String>) -> ThrottleDecision {
        for rule in &self.rules {
            if (rule.matches)(annotations) {
                return ThrottleDecision {
                    result: rule.result,
                    rule_name: rule.name.clone(),
                    rate: rule.rate,
                };
            }
        }

        let mut rng = rand::rng();
        let sampled: f64 = rng.random();
        let result = if sampled < self.default_rate {
            ThrottleResult::Accept
        } else {
            ThrottleResult::Defer
        };

        ThrottleDecision {
            result,
            rule_name: "default".to_string(),
            rate: self.default_rate,
        }
    }
}
