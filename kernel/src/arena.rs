//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 带代号 (generation) 的定长槽位表
//!
//! 任务表和同步对象表的底层存储。槽位在创建时一次性预留，插入/删除不再分配内存；
//! 槽位被复用时代号加一，旧的 id 因此失效而不会指向新对象。

use alloc::vec::Vec;

/// 槽位索引 + 代号
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    pub index: u32,
    pub gen: u32,
}

impl Key {
    /// 打包成 u64（高 32 位代号，低 32 位索引），用于请求桥传参
    #[inline]
    pub const fn as_raw(self) -> u64 {
        ((self.gen as u64) << 32) | self.index as u64
    }

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self {
            index: raw as u32,
            gen: (raw >> 32) as u32,
        }
    }
}

struct Slot<T> {
    gen: u32,
    value: Option<T>,
}

pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    capacity: usize,
    len: usize,
}

impl<T> Arena<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::with_capacity(capacity),
            capacity,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len >= self.capacity
    }

    /// 插入新值，值的构造需要知道自己的 key；表满时返回 `None`
    pub fn insert_with<F: FnOnce(Key) -> T>(&mut self, f: F) -> Option<Key> {
        if self.is_full() {
            return None;
        }

        let key = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                Key { index, gen: slot.gen }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot { gen: 0, value: None });
                Key { index, gen: 0 }
            }
        };

        self.slots[key.index as usize].value = Some(f(key));
        self.len += 1;
        Some(key)
    }

    pub fn get(&self, key: Key) -> Option<&T> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.gen == key.gen)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.gen == key.gen)
            .and_then(|slot| slot.value.as_mut())
    }

    #[inline]
    pub fn contains(&self, key: Key) -> bool {
        self.get(key).is_some()
    }

    /// 删除并返回值，槽位代号加一
    pub fn remove(&mut self, key: Key) -> Option<T> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.gen != key.gen {
            return None;
        }
        let value = slot.value.take()?;
        slot.gen = slot.gen.wrapping_add(1);
        self.free.push(key.index);
        self.len -= 1;
        Some(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Key, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.value.as_ref().map(|v| {
                (
                    Key {
                        index: i as u32,
                        gen: slot.gen,
                    },
                    v,
                )
            })
        })
    }
}
