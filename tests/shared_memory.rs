// Shared memory backend tests for Linux
// Run with: cargo test --test shared_memory -- --nocapture
//
// Region names are prefixed with the pid so parallel test binaries do not
// collide in /dev/shm.

#[cfg(target_os = "linux")]
mod linux_tests {
    use ringqueue_lf::Core::{
        attach_shared_memory, create_shared_memory, RawHandle, RegionKind, SharedMemoryAllocator,
    };
    use ringqueue_lf::{AllocError, PeerRole, PopError, QueueBuilder};
    use serial_test::serial;
    use std::io::ErrorKind;
    use std::path::Path;

    fn unique(tag: &str) -> String {
        format!("t{}_{}", std::process::id(), tag)
    }

    #[test]
    fn test_create_shared_memory() {
        let size = 4096;
        let shm = create_shared_memory(&unique("create"), size).unwrap();

        assert_eq!(shm.size(), size);
        assert!(!shm.as_ptr().is_null());
        assert_eq!(shm.as_ptr() as usize % ringqueue_lf::Core::REGION_ALIGN, 0);

        unsafe {
            let slice = std::slice::from_raw_parts_mut(shm.as_ptr(), size);
            assert!(slice.iter().all(|&b| b == 0), "fresh region should be zeroed");
            slice[0] = 0x42;
            assert_eq!(slice[0], 0x42);
        }

        match shm.raw_handle() {
            RawHandle::Fd(fd) => assert!(fd >= 0),
            other => panic!("expected a file descriptor, got {other:?}"),
        }
    }

    #[test]
    fn test_creator_unlinks_on_drop() {
        let name = unique("unlink");
        let path = format!("/dev/shm/{name}");

        let shm = create_shared_memory(&name, 1024).unwrap();
        assert!(Path::new(&path).exists());

        drop(shm);
        assert!(!Path::new(&path).exists());
    }

    #[test]
    fn test_attach_sees_writes() {
        let name = unique("attach");
        let size = 8192;
        let owner = create_shared_memory(&name, size).unwrap();

        unsafe {
            let slice = std::slice::from_raw_parts_mut(owner.as_ptr(), size);
            for (i, b) in slice.iter_mut().enumerate().take(100) {
                *b = (i % 256) as u8;
            }
        }

        let peer = attach_shared_memory(&name, size).unwrap();
        assert_eq!(peer.size(), size);
        unsafe {
            let slice = std::slice::from_raw_parts(peer.as_ptr(), size);
            for (i, b) in slice.iter().enumerate().take(100) {
                assert_eq!(*b, (i % 256) as u8);
            }
        }

        // Writes through the second mapping are visible to the first.
        unsafe { *peer.as_ptr().add(500) = 0xAA };
        assert_eq!(unsafe { *owner.as_ptr().add(500) }, 0xAA);

        let err = attach_shared_memory(&name, size * 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_attach_missing_region() {
        let err = attach_shared_memory(&unique("missing"), 4096).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_invalid_region_name() {
        let err = create_shared_memory("a/b", 4096).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = create_shared_memory("", 4096).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_region_names() {
        let alloc = SharedMemoryAllocator::new("orders");
        assert_eq!(alloc.name(), "orders");
        assert_eq!(alloc.region_name(RegionKind::Ring), "rq_orders_ring");
        assert_eq!(alloc.region_name(RegionKind::Session), "rq_orders_sess");
    }

    #[test]
    #[serial]
    fn test_queue_opened_by_name() {
        let name = unique("queue");
        let owner = QueueBuilder::new()
            .with_capacity_hint(1024)
            .with_producers(1)
            .with_consumers(2)
            .with_shared_name(name.clone())
            .build()
            .unwrap();
        assert!(owner.storage().is_shared());

        let peer = QueueBuilder::new().with_shared_name(name).open().unwrap();
        assert_eq!(peer.producer_capacity(), 1);
        assert_eq!(peer.consumer_capacity(), 2);
        assert_eq!(peer.storage().capacity(), 2048);

        // Slot tables live in the shared region: the single producer slot
        // taken through one handle is taken for the other too.
        let mut producer = owner.attach_producer().unwrap();
        let err = peer.attach_producer().unwrap_err();
        assert_eq!(err.role, PeerRole::Producer);
        assert_eq!(peer.attached_producers(), 1);

        let mut consumer = peer.attach_consumer().unwrap();
        producer.push(b"across mappings").unwrap();

        let mut buf = [0u8; 64];
        assert_eq!(consumer.pop(&mut buf), Ok(15));
        assert_eq!(&buf[..15], b"across mappings");
        assert_eq!(consumer.pop(&mut buf), Err(PopError::Empty));
        assert_eq!(owner.storage().head(), peer.storage().head());
        assert_eq!(owner.storage().tail(), 19);
    }

    #[test]
    #[serial]
    fn test_open_requires_shared_storage() {
        assert!(matches!(QueueBuilder::new().open(), Err(AllocError::Layout)));

        match QueueBuilder::new().with_shared_name(unique("absent")).open() {
            Err(AllocError::Io(e)) => assert_eq!(e.kind(), ErrorKind::NotFound),
            other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod non_linux_tests {
    use ringqueue_lf::Core::{attach_shared_memory, create_shared_memory};

    #[test]
    fn test_unsupported_platform() {
        let err = create_shared_memory("test", 4096).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::Unsupported);

        let err = attach_shared_memory("test", 4096).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::Unsupported);
    }
}
