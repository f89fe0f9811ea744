use crate::cli::error::CliFailure;

/// Classification of a failed launch attempt, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The CLI produced no error payload at all.
    Empty,
    /// The request timed out in flight.
    Timeout,
    /// Credentials are bad; no retry can help.
    Auth,
    /// The request itself is wrong (permissions, parameters, limits).
    Config,
    /// The target is in a transitional state; worth retrying.
    State,
    /// The AD is out of capacity; rotate to the next one.
    Capacity,
    /// The service is rate limiting us; back off between cycles.
    Throttle,
    /// Anything else; counted against the error budget.
    Unknown,
}

impl Outcome {
    /// Fatal outcomes terminate the run immediately.
    pub fn is_fatal(self) -> bool {
        matches!(self, Outcome::Auth | Outcome::Config)
    }

    /// Whether this outcome counts against the run-wide error budget.
    pub fn counts_total(self) -> bool {
        matches!(self, Outcome::Empty | Outcome::Timeout | Outcome::Unknown)
    }

    /// Whether this outcome marks the cycle dirty. TIMEOUT deliberately
    /// counts toward the total budget without dirtying the cycle.
    pub fn counts_cycle(self) -> bool {
        matches!(self, Outcome::Empty | Outcome::Unknown)
    }

    pub fn describe(self) -> &'static str {
        match self {
            Outcome::Empty => "empty response",
            Outcome::Timeout => "request timed out",
            Outcome::Auth => "authentication error",
            Outcome::Config => "configuration error",
            Outcome::State => "resource in transitional state",
            Outcome::Capacity => "out of capacity",
            Outcome::Throttle => "throttled",
            Outcome::Unknown => "unclassified error",
        }
    }
}

/// Map a CLI failure onto the retry policy. The match arms are ordered by
/// priority; the first hit wins.
pub fn classify(failure: &CliFailure) -> Outcome {
    if failure.raw.trim().is_empty() {
        return Outcome::Empty;
    }

    let message = failure
        .message
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();

    if message.contains("timed out") {
        return Outcome::Timeout;
    }
    if failure.code == "NotAuthenticated" || failure.status == 401 {
        return Outcome::Auth;
    }
    if matches!(
        failure.code.as_str(),
        "NotAuthorizedOrNotFound" | "InvalidParameter" | "LimitExceeded"
    ) {
        return Outcome::Config;
    }
    if failure.code == "IncorrectState" || failure.status == 409 {
        return Outcome::State;
    }
    if failure.code == "InternalError" && (message.contains("out") || message.contains("capacity"))
    {
        return Outcome::Capacity;
    }
    if failure.status == 429 || failure.code == "TooManyRequests" {
        return Outcome::Throttle;
    }
    Outcome::Unknown
}
