use eyre::{Report, Result as EyreResult};
use multiaddr::Multiaddr;
use tokio::sync::oneshot;

use crate::handler::EventHandler;
use crate::EventLoop;

#[derive(Debug)]
pub(crate) struct ListenOn {
    pub addr: Multiaddr,
    pub outcome: oneshot::Sender<EyreResult<Multiaddr>>,
}

impl EventHandler<ListenOn> for EventLoop {
    fn handle(&mut self, ListenOn { addr, outcome }: ListenOn) {
        match self.swarm.listen_on(addr.clone()) {
            Ok(listener_id) => {
                let _ignored = self.pending_listen.insert(listener_id, outcome);
            }
            Err(err) => {
                let err = Report::new(err).wrap_err(format!("failed to listen on {addr}"));
                let _ignored = outcome.send(Err(err));
            }
        }
    }
}
