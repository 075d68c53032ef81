//! Process-wide room registry: the single entry point for publish and
//! subscribe signaling, room listing and teardown.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use livertc_core::{Config, RecordingUploader, SfuMetrics};

use crate::error::Result;
use crate::room::{Room, RoomInfo};

pub struct Manager {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    cfg: Arc<Config>,
    metrics: Arc<SfuMetrics>,
    uploader: Arc<dyn RecordingUploader>,
}

impl Manager {
    pub fn new(
        cfg: Arc<Config>,
        metrics: Arc<SfuMetrics>,
        uploader: Arc<dyn RecordingUploader>,
    ) -> Arc<Self> {
        Arc::new(Self {
            rooms: RwLock::new(HashMap::new()),
            cfg,
            metrics,
            uploader,
        })
    }

    /// Rooms are created lazily on first publish or subscribe. The rooms
    /// gauge is updated under the same lock as the map.
    fn get_or_create_room(&self, name: &str) -> Arc<Room> {
        let mut rooms = self.rooms.write();
        if let Some(room) = rooms.get(name) {
            return Arc::clone(room);
        }
        let room = Room::new(
            name,
            Arc::clone(&self.cfg),
            Arc::clone(&self.metrics),
            Arc::clone(&self.uploader),
        );
        rooms.insert(name.to_string(), Arc::clone(&room));
        self.metrics.set_rooms(rooms.len());
        info!(room = name, total = rooms.len(), "room created");
        room
    }

    /// Accept a publisher offer for the named room and return the answer.
    pub async fn publish(&self, room_name: &str, offer_sdp: String) -> Result<String> {
        let room = self.get_or_create_room(room_name);
        room.publish(offer_sdp).await
    }

    /// Accept a subscriber offer for the named room and return the answer.
    pub async fn subscribe(&self, room_name: &str, offer_sdp: String) -> Result<String> {
        let room = self.get_or_create_room(room_name);
        room.subscribe(offer_sdp).await
    }

    /// Snapshot of every room, in no particular order.
    pub fn list_rooms(&self) -> Vec<RoomInfo> {
        self.rooms.read().values().map(|room| room.stats()).collect()
    }

    /// Remove and close the named room. Returns whether it existed. The
    /// room itself is closed outside the registry lock.
    pub async fn close_room(&self, name: &str) -> bool {
        let room = {
            let mut rooms = self.rooms.write();
            let room = rooms.remove(name);
            if room.is_some() {
                self.metrics.set_rooms(rooms.len());
            }
            room
        };
        match room {
            Some(room) => {
                room.close().await;
                info!(room = name, "room closed by request");
                true
            }
            None => false,
        }
    }

    /// Close every room. Used on process shutdown so no peer connection
    /// outlives the server.
    pub async fn close_all(&self) {
        let rooms: Vec<Arc<Room>> = {
            let mut rooms = self.rooms.write();
            self.metrics.set_rooms(0);
            rooms.drain().map(|(_, room)| room).collect()
        };
        for room in rooms {
            room.close().await;
        }
        info!("all rooms closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livertc_core::NoopUploader;

    fn test_manager() -> (Arc<Manager>, Arc<SfuMetrics>) {
        let metrics = Arc::new(SfuMetrics::new());
        let manager = Manager::new(
            Arc::new(Config::default()),
            Arc::clone(&metrics),
            Arc::new(NoopUploader),
        );
        (manager, metrics)
    }

    #[test]
    fn test_get_or_create_room_returns_same_instance() {
        let (manager, _) = test_manager();

        let room1 = manager.get_or_create_room("demo");
        let room2 = manager.get_or_create_room("demo");
        assert!(Arc::ptr_eq(&room1, &room2));

        let other = manager.get_or_create_room("other");
        assert!(!Arc::ptr_eq(&room1, &other));
    }

    #[test]
    fn test_list_rooms() {
        let (manager, _) = test_manager();
        assert!(manager.list_rooms().is_empty());

        manager.get_or_create_room("room1");
        manager.get_or_create_room("room2");
        manager.get_or_create_room("room3");

        let rooms = manager.list_rooms();
        assert_eq!(rooms.len(), 3);
        let mut names: Vec<&str> = rooms.iter().map(|r| r.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, ["room1", "room2", "room3"]);
        assert!(rooms.iter().all(|r| !r.has_publisher));
    }

    #[tokio::test]
    async fn test_close_room() {
        let (manager, metrics) = test_manager();
        manager.get_or_create_room("demo");
        assert_eq!(manager.list_rooms().len(), 1);

        assert!(manager.close_room("demo").await);
        assert!(manager.list_rooms().is_empty());

        assert!(!manager.close_room("demo").await);
        assert!(!manager.close_room("never-existed").await);

        let output = metrics.gather().unwrap();
        assert!(output.contains("webrtc_rooms 0"));
    }

    #[tokio::test]
    async fn test_close_all() {
        let (manager, metrics) = test_manager();
        manager.get_or_create_room("room1");
        manager.get_or_create_room("room2");

        let output = metrics.gather().unwrap();
        assert!(output.contains("webrtc_rooms 2"));

        manager.close_all().await;
        assert!(manager.list_rooms().is_empty());

        let output = metrics.gather().unwrap();
        assert!(output.contains("webrtc_rooms 0"));
    }

    #[tokio::test]
    async fn test_concurrent_creation_collapses_to_one_room() {
        let (manager, _) = test_manager();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    manager.get_or_create_room("contended");
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(manager.list_rooms().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_creates_room_even_on_bad_offer() {
        let (manager, _) = test_manager();
        let result = manager.publish("demo", "garbage".to_string()).await;
        assert!(result.is_err());

        // The room exists afterwards with an empty publisher slot.
        let rooms = manager.list_rooms();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].name, "demo");
        assert!(!rooms[0].has_publisher);
    }
}
