use multiaddr::Multiaddr;
use tokio::sync::oneshot;

use crate::handler::EventHandler;
use crate::EventLoop;

#[derive(Debug)]
pub(crate) struct Listeners {
    pub outcome: oneshot::Sender<Vec<Multiaddr>>,
}

impl EventHandler<Listeners> for EventLoop {
    fn handle(&mut self, Listeners { outcome }: Listeners) {
        let _ignored = outcome.send(self.swarm.listeners().cloned().collect());
    }
}
