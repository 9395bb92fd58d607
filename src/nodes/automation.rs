/// Parameter automation - scheduled value changes evaluated per sample
///
/// A [`Param`] is the control-rate half of every gain and frequency in the
/// graph. It supports the schedule primitives the layer recipes need:
///
/// - `set_value_at(t, v)`: jump to `v` at `t`
/// - `linear_ramp_to(t, v)`: straight line from the previous event to `v` at `t`
/// - `exponential_ramp_to(t, v)`: geometric curve from the previous event to `v` at `t`
/// - `set_target(v, tau)`: exponential approach with time constant `tau`
///
/// Scheduled times are in seconds relative to the first sample the param
/// produced, so one-shot transients describe their envelope from 0.
///
/// The exponential approach uses the same coefficient as a one-pole lag:
///
/// ```text
/// coeff = 1 - exp(-1 / (tau * sample_rate))
/// value += (target - value) * coeff
/// ```
///
/// After one time constant the value has covered ~63% of the distance, after
/// five ~99.3%.

use std::collections::VecDeque;

/// Values closer than this to the target snap onto it
const SETTLE_EPSILON: f32 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Event {
    Set { time: f64, value: f32 },
    Linear { time: f64, value: f32 },
    Exponential { time: f64, value: f32 },
}

impl Event {
    fn time(&self) -> f64 {
        match *self {
            Event::Set { time, .. } | Event::Linear { time, .. } | Event::Exponential { time, .. } => {
                time
            }
        }
    }

    fn value(&self) -> f32 {
        match *self {
            Event::Set { value, .. } | Event::Linear { value, .. } | Event::Exponential { value, .. } => {
                value
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Approach {
    target: f32,
    time_constant: f32,
}

/// An automatable control value
#[derive(Debug, Clone)]
pub struct Param {
    value: f32,
    events: VecDeque<Event>,
    approach: Option<Approach>,
    /// End point of the last event that fired: ramps start from here
    anchor: (f64, f32),
    /// Seconds of output produced so far
    clock: f64,
}

impl Param {
    pub fn new(value: f32) -> Self {
        Self {
            value,
            events: VecDeque::new(),
            approach: None,
            anchor: (0.0, value),
            clock: 0.0,
        }
    }

    /// Current value (the value the next sample starts from)
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Where the param is heading: the last scheduled value, the approach
    /// target, or the current value when idle
    pub fn target(&self) -> f32 {
        if let Some(last) = self.events.back() {
            return last.value();
        }
        match self.approach {
            Some(a) => a.target,
            None => self.value,
        }
    }

    /// Jump immediately, cancelling everything scheduled
    pub fn set_value(&mut self, value: f32) {
        self.value = value;
        self.events.clear();
        self.approach = None;
        self.anchor = (self.now(), value);
    }

    pub fn set_value_at(&mut self, time: f64, value: f32) -> &mut Self {
        self.push(Event::Set { time, value })
    }

    pub fn linear_ramp_to(&mut self, time: f64, value: f32) -> &mut Self {
        self.push(Event::Linear { time, value })
    }

    pub fn exponential_ramp_to(&mut self, time: f64, value: f32) -> &mut Self {
        self.push(Event::Exponential { time, value })
    }

    /// Exponentially approach `target` from the current value
    ///
    /// Cancels pending scheduled events: the approach starts from wherever
    /// the param is now, so a retarget never causes a step.
    pub fn set_target(&mut self, target: f32, time_constant: f32) {
        self.events.clear();
        self.anchor = (self.now(), self.value);
        self.approach = Some(Approach {
            target,
            time_constant: time_constant.max(1e-4),
        });
    }

    /// Produce the value for the next sample
    pub fn next(&mut self, sample_rate: f32) -> f32 {
        let now = self.clock;

        while let Some(event) = self.events.front().copied() {
            if event.time() > now {
                break;
            }
            self.events.pop_front();
            self.value = event.value();
            self.anchor = (event.time(), event.value());
            self.approach = None;
        }

        match self.events.front().copied() {
            Some(Event::Linear { time, value }) => {
                let (t0, v0) = self.anchor;
                let span = time - t0;
                if span > 0.0 {
                    let frac = ((now - t0) / span).clamp(0.0, 1.0) as f32;
                    self.value = v0 + (value - v0) * frac;
                }
            }
            Some(Event::Exponential { time, value }) => {
                let (t0, v0) = self.anchor;
                let span = time - t0;
                if span > 0.0 {
                    let frac = ((now - t0) / span).clamp(0.0, 1.0) as f32;
                    self.value = if v0 > 0.0 && value > 0.0 {
                        v0 * (value / v0).powf(frac)
                    } else {
                        v0 + (value - v0) * frac
                    };
                }
            }
            Some(Event::Set { .. }) => {}
            None => {
                if let Some(approach) = self.approach {
                    let coeff = 1.0 - (-1.0 / (approach.time_constant * sample_rate)).exp();
                    self.value += (approach.target - self.value) * coeff;
                    if (approach.target - self.value).abs() < SETTLE_EPSILON {
                        self.value = approach.target;
                        self.approach = None;
                    }
                }
            }
        }

        self.clock += 1.0 / sample_rate as f64;
        self.value
    }

    /// True once no scheduled events or approach remain
    pub fn is_idle(&self) -> bool {
        self.events.is_empty() && self.approach.is_none()
    }

    fn push(&mut self, event: Event) -> &mut Self {
        // Keep events sorted by time; equal times keep insertion order
        let index = self
            .events
            .iter()
            .position(|e| e.time() > event.time())
            .unwrap_or(self.events.len());
        self.events.insert(index, event);
        self
    }

    fn now(&self) -> f64 {
        self.clock
    }
}
