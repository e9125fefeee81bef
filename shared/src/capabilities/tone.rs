use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

/// Envelope of the short confirmation beep.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ToneSpec {
    pub frequency_hz: f32,
    pub floor_gain: f32,
    pub peak_gain: f32,
    pub attack_ms: u32,
    pub release_at_ms: u32,
    pub stop_at_ms: u32,
}

impl Default for ToneSpec {
    fn default() -> Self {
        Self {
            frequency_hz: 880.0,
            floor_gain: 0.001,
            peak_gain: 0.2,
            attack_ms: 10,
            release_at_ms: 120,
            stop_at_ms: 140,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum ToneOperation {
    /// Fire and forget; an unavailable audio output is not an error.
    Play(ToneSpec),
}

impl Operation for ToneOperation {
    type Output = ();
}

#[derive(Clone)]
pub struct Tone<Ev> {
    context: CapabilityContext<ToneOperation, Ev>,
}

impl<Ev> Capability<Ev> for Tone<Ev> {
    type Operation = ToneOperation;
    type MappedSelf<MappedEv> = Tone<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static,
    {
        Tone::new(self.context.map_event(f))
    }
}

impl<Ev> Tone<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<ToneOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn confirm(&self) {
        self.play(ToneSpec::default());
    }

    pub fn play(&self, spec: ToneSpec) {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            ctx.notify_shell(ToneOperation::Play(spec)).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_envelope() {
        let spec = ToneSpec::default();
        assert!((spec.frequency_hz - 880.0).abs() < f32::EPSILON);
        assert!(spec.attack_ms < spec.release_at_ms);
        assert!(spec.release_at_ms < spec.stop_at_ms);
    }
}
