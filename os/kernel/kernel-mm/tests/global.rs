use kernel_info::memory::PAGE_SIZE;
use kernel_mm::{ExtentType, MemoryConfig, MemoryError, MemoryManager, global};
use std::thread;

// One test per binary: the installed manager lives for the whole process.
#[test]
fn install_once_then_reach_from_anywhere() {
    assert!(global().is_none());

    let mm = MemoryManager::new(&MemoryConfig::default()).unwrap();
    let installed = mm.install().unwrap();
    assert!(std::ptr::eq(installed, global().unwrap()));

    let again = MemoryManager::new(&MemoryConfig::default()).unwrap();
    assert!(matches!(again.install(), Err(MemoryError::AlreadyInstalled)));

    let frames = thread::spawn(|| {
        global()
            .unwrap()
            .allocate_physical(None, 4 * PAGE_SIZE, ExtentType::PAGE_TABLE)
            .unwrap()
    })
    .join()
    .unwrap();

    let mm = global().unwrap();
    assert_eq!(mm.query_physical(frames).unwrap().ty(), ExtentType::PAGE_TABLE);
    assert_eq!(mm.free_physical(frames, None), Ok(4 * PAGE_SIZE));
}
