use super::EventHandler;
use crate::EventLoop;

mod admit;
mod dial;
mod disconnect;
mod listen;
mod listeners;

pub(crate) use admit::Admit;
pub(crate) use dial::Dial;
pub(crate) use disconnect::Disconnect;
pub(crate) use listen::ListenOn;
pub(crate) use listeners::Listeners;

/// Requests from a [`NetworkClient`](crate::client::NetworkClient) to the
/// event loop, which alone touches the swarm.
#[derive(Debug)]
pub(crate) enum Command {
    Admit(Admit),
    Dial(Dial),
    Disconnect(Disconnect),
    ListenOn(ListenOn),
    Listeners(Listeners),
}

impl EventHandler<Command> for EventLoop {
    fn handle(&mut self, command: Command) {
        match command {
            Command::Admit(admit) => self.handle(admit),
            Command::Dial(dial) => self.handle(dial),
            Command::Disconnect(disconnect) => self.handle(disconnect),
            Command::ListenOn(listen) => self.handle(listen),
            Command::Listeners(listeners) => self.handle(listeners),
        }
    }
}
