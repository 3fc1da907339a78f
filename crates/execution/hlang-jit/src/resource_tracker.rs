//! 资源追踪器
//!
//! 把 JIT 拥有的分配（每代函数体模块）按组登记，支持整组撤销。
//! 旧代函数体在桩可能仍然分发到它们期间保持存活；撤销由运行器
//! 在确认不可达后显式触发（保守默认：进程退出时回收）。

use std::collections::HashMap;

use cranelift_jit::JITModule;

/// 撤销句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceTracker {
    id: u64,
}

impl ResourceTracker {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// 一代已物化的函数体
pub struct MaterializedGeneration {
    jit: Option<JITModule>,
    /// 改名后函数体符号 → 可执行地址
    pub addresses: HashMap<String, usize>,
}

// 生成代只在引擎互斥锁内访问
unsafe impl Send for MaterializedGeneration {}

impl MaterializedGeneration {
    pub fn new(jit: JITModule, addresses: HashMap<String, usize>) -> Self {
        Self {
            jit: Some(jit),
            addresses,
        }
    }
}

/// 追踪器登记表
#[derive(Default)]
pub struct ResourceRegistry {
    next_id: u64,
    retained: HashMap<u64, Vec<MaterializedGeneration>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_tracker(&mut self) -> ResourceTracker {
        let id = self.next_id;
        self.next_id += 1;
        self.retained.insert(id, Vec::new());
        ResourceTracker { id }
    }

    /// 把一代函数体挂到追踪器下
    pub fn retain(&mut self, tracker: ResourceTracker, generation: MaterializedGeneration) {
        self.retained
            .entry(tracker.id)
            .or_default()
            .push(generation);
    }

    /// 整组撤销并释放可执行内存。
    ///
    /// # Safety
    ///
    /// 调用方必须保证没有任何桩仍指向该组函数体，也没有运行中
    /// 的栈帧持有其指针。
    pub unsafe fn revoke(&mut self, tracker: ResourceTracker) {
        if let Some(generations) = self.retained.remove(&tracker.id) {
            for mut generation in generations {
                if let Some(jit) = generation.jit.take() {
                    jit.free_memory();
                }
            }
        }
    }

    pub fn tracked_generation_count(&self, tracker: ResourceTracker) -> usize {
        self.retained
            .get(&tracker.id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_ids_are_distinct() {
        let mut registry = ResourceRegistry::new();
        let first = registry.create_tracker();
        let second = registry.create_tracker();
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_revoke_removes_group() {
        let mut registry = ResourceRegistry::new();
        let tracker = registry.create_tracker();
        assert_eq!(registry.tracked_generation_count(tracker), 0);
        unsafe { registry.revoke(tracker) };
        assert_eq!(registry.tracked_generation_count(tracker), 0);
    }
}
