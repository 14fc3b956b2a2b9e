//! Queue of objects drawn as far-texture impostors this frame.

use std::collections::HashSet;

use hecs::Entity;

use crate::device::{DeviceCommand, GraphicsDevice};

#[derive(Debug, Default)]
pub struct FarTextureHandler {
    queue: Vec<Entity>,
    queued: HashSet<Entity>,
}

impl FarTextureHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an impostor draw; an object is queued at most once per flush.
    pub fn queue(&mut self, entity: Entity) {
        if self.queued.insert(entity) {
            self.queue.push(entity);
        }
    }

    /// Draw every queued impostor and empty the queue.
    pub fn draw(&mut self, dev: &mut dyn GraphicsDevice) -> usize {
        let n = self.queue.len();
        for entity in self.queue.drain(..) {
            dev.submit(DeviceCommand::DrawFarTexture { entity });
        }
        self.queued.clear();
        if n > 0 {
            log::trace!("[FarTextureHandler] drew {n} impostors");
        }
        n
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.queued.contains(&entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RecordingDevice;
    use hecs::World;

    #[test]
    fn queue_dedups_and_flush_empties() {
        let mut world = World::new();
        let a = world.spawn(());
        let b = world.spawn(());
        let mut far = FarTextureHandler::new();
        far.queue(a);
        far.queue(b);
        far.queue(a);
        assert_eq!(far.len(), 2);

        let mut dev = RecordingDevice::new();
        assert_eq!(far.draw(&mut dev), 2);
        assert!(far.is_empty());
        assert_eq!(dev.commands[0], DeviceCommand::DrawFarTexture { entity: a });
        assert_eq!(far.draw(&mut dev), 0);
    }
}
