use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

/// Periodic `Event::Tick` while a trip is running.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TickerOperation {
    Start { interval_ms: u64 },
    Stop,
}

impl Operation for TickerOperation {
    type Output = ();
}

#[derive(Clone)]
pub struct Ticker<Ev> {
    context: CapabilityContext<TickerOperation, Ev>,
}

impl<Ev> Capability<Ev> for Ticker<Ev> {
    type Operation = TickerOperation;
    type MappedSelf<MappedEv> = Ticker<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static,
    {
        Ticker::new(self.context.map_event(f))
    }
}

impl<Ev> Ticker<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<TickerOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn start(&self, interval_ms: u64) {
        self.notify(TickerOperation::Start { interval_ms });
    }

    pub fn stop(&self) {
        self.notify(TickerOperation::Stop);
    }

    fn notify(&self, operation: TickerOperation) {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            ctx.notify_shell(operation).await;
        });
    }
}
