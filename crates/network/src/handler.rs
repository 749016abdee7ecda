pub(crate) mod command;
mod swarm;

pub(crate) trait EventHandler<E> {
    fn handle(&mut self, event: E);
}
