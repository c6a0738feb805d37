//! The power negotiation state machine as a pure table.

use core::fmt;

/// Where the daemon believes the USB power path is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerState {
    /// No USB power.
    Unconnected,
    /// Powered, waiting for the host to enumerate us.
    AwaitingEnum,
    /// Enumerated by a host; drawing high current.
    Enumerated,
    /// Powered by something that never enumerated (a charger); drawing high
    /// current.
    OnBattery,
}

impl PowerState {
    pub const ALL: [Self; 4] = [
        Self::Unconnected,
        Self::AwaitingEnum,
        Self::Enumerated,
        Self::OnBattery,
    ];
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unconnected => "unconnected",
            Self::AwaitingEnum => "awaiting enumeration",
            Self::Enumerated => "enumerated",
            Self::OnBattery => "on battery",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerEvent {
    PowerOn,
    PowerOff,
    Reset,
    Enumerated,
    Timeout,
}

impl PowerEvent {
    pub const ALL: [Self; 5] = [
        Self::PowerOn,
        Self::PowerOff,
        Self::Reset,
        Self::Enumerated,
        Self::Timeout,
    ];
}

impl fmt::Display for PowerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PowerOn => "power on",
            Self::PowerOff => "power off",
            Self::Reset => "bus reset",
            Self::Enumerated => "enumerated",
            Self::Timeout => "enumeration timeout",
        };
        f.write_str(name)
    }
}

/// What happens to the enumeration timer on a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    Keep,
    Start,
    Cancel,
}

/// Result of applying an event the current state accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: PowerState,
    pub timer: TimerAction,
    /// New current limit, if it changes.
    pub high_power: Option<bool>,
}

impl Transition {
    const fn to(next: PowerState) -> Self {
        Self {
            next,
            timer: TimerAction::Keep,
            high_power: None,
        }
    }

    const fn timer(mut self, timer: TimerAction) -> Self {
        self.timer = timer;
        self
    }

    const fn power(mut self, high: bool) -> Self {
        self.high_power = Some(high);
        self
    }
}

/// Look up `event` in `state`.
///
/// `None` means the event cannot happen in that state; the caller logs it and
/// stays put. Accepted no-ops return a transition back to `state`.
pub fn transition(state: PowerState, event: PowerEvent) -> Option<Transition> {
    use PowerEvent as E;
    use PowerState as S;

    let transition = match (state, event) {
        (S::Unconnected, E::PowerOn) => Transition::to(S::AwaitingEnum).timer(TimerAction::Start),
        // Resets arrive shortly after the cable is pulled out.
        (S::Unconnected, E::Reset) => Transition::to(S::Unconnected),

        (S::AwaitingEnum, E::PowerOff) => {
            Transition::to(S::Unconnected).timer(TimerAction::Cancel)
        }
        (S::AwaitingEnum, E::Reset) => Transition::to(S::AwaitingEnum),
        (S::AwaitingEnum, E::Enumerated) => Transition::to(S::Enumerated)
            .timer(TimerAction::Cancel)
            .power(true),
        (S::AwaitingEnum, E::Timeout) => Transition::to(S::OnBattery).power(true),

        (S::Enumerated, E::PowerOff) => Transition::to(S::Unconnected).power(false),
        (S::Enumerated, E::Reset) => Transition::to(S::AwaitingEnum).power(false),
        (S::Enumerated, E::Enumerated) => Transition::to(S::Enumerated),

        (S::OnBattery, E::PowerOff) => Transition::to(S::Unconnected).power(false),
        (S::OnBattery, E::Enumerated) => Transition::to(S::Enumerated),

        _ => return None,
    };
    Some(transition)
}
