//! Stable-offset storage for per-object matrices and uniform records.
//!
//! Batched submissions reference objects by integer offset into these arenas,
//! so an offset handed out must keep pointing at the same slots until freed.
//! Storage is paged: growth appends pages and never moves existing elements.

use std::collections::BTreeMap;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Frames a written slot stays dirty for re-upload.
pub const BUFFERING: u64 = 3;

const PAGE_SIZE: usize = 1024;

/// Paged arena with a first-fit free list.
#[derive(Debug)]
pub struct SegmentedArena<T> {
    pages: Vec<Box<[T]>>,
    /// Draw frame + 1 of the last write per slot, 0 if never written.
    stamps: Vec<Box<[u64]>>,
    /// High-water mark of handed-out elements.
    len: usize,
    /// Free runs: start -> length. Adjacent runs are always merged.
    free: BTreeMap<usize, usize>,
    zero: T,
}

impl<T: Copy> SegmentedArena<T> {
    pub fn new(zero: T) -> Self {
        Self {
            pages: Vec::new(),
            stamps: Vec::new(),
            len: 0,
            free: BTreeMap::new(),
            zero,
        }
    }

    /// Reserve `count` contiguous slots and return the first offset.
    pub fn allocate(&mut self, count: usize) -> usize {
        if count == 0 {
            return self.len;
        }

        let fit = self.free.iter().find(|(_, len)| **len >= count).map(|(s, l)| (*s, *l));
        if let Some((start, run)) = fit {
            self.free.remove(&start);
            if run > count {
                self.free.insert(start + count, run - count);
            }
            return start;
        }

        // A free run touching the end can be extended in place.
        let tail = self.free.iter().next_back().map(|(s, l)| (*s, *l));
        let start = match tail {
            Some((s, l)) if s + l == self.len => {
                self.free.remove(&s);
                s
            }
            _ => self.len,
        };
        self.len = start + count;
        self.reserve_pages(self.len);
        start
    }

    /// Zero-fill a run and return it to the free list.
    pub fn free(&mut self, first: usize, count: usize) {
        if count == 0 {
            return;
        }
        debug_assert!(first + count <= self.len, "freeing unallocated slots {first}+{count}");
        for i in first..(first + count).min(self.len) {
            let (p, o) = Self::split(i);
            self.pages[p][o] = self.zero;
            self.stamps[p][o] = 0;
        }

        let mut start = first;
        let mut len = count;
        if let Some((&prev_start, &prev_len)) = self.free.range(..first).next_back() {
            if prev_start + prev_len == first {
                self.free.remove(&prev_start);
                start = prev_start;
                len += prev_len;
            }
        }
        if let Some(&next_len) = self.free.get(&(first + count)) {
            self.free.remove(&(first + count));
            len += next_len;
        }
        self.free.insert(start, len);
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        let (p, o) = Self::split(index);
        Some(&self.pages[p][o])
    }

    /// Write access; marks the slot as touched in `frame`.
    pub fn get_mut(&mut self, index: usize, frame: u64) -> Option<&mut T> {
        if index >= self.len {
            return None;
        }
        let (p, o) = Self::split(index);
        self.stamps[p][o] = frame + 1;
        Some(&mut self.pages[p][o])
    }

    /// Whether the slot was written within the last [`BUFFERING`] frames.
    pub fn is_dirty(&self, index: usize, frame: u64) -> bool {
        if index >= self.len {
            return false;
        }
        let (p, o) = Self::split(index);
        let stamp = self.stamps[p][o];
        stamp != 0 && (frame + 1).saturating_sub(stamp) < BUFFERING
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Slots currently on the free list.
    pub fn free_slots(&self) -> usize {
        self.free.values().sum()
    }

    fn split(index: usize) -> (usize, usize) {
        (index / PAGE_SIZE, index % PAGE_SIZE)
    }

    fn reserve_pages(&mut self, len: usize) {
        while self.pages.len() * PAGE_SIZE < len {
            self.pages.push(vec![self.zero; PAGE_SIZE].into_boxed_slice());
            self.stamps.push(vec![0; PAGE_SIZE].into_boxed_slice());
        }
    }
}

/// Per-object record read by the batched shader path.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ModelUniformData {
    pub team: u32,
    pub draw_flag: u32,
    pub build_progress: f32,
    pub health_fraction: f32,
    pub draw_alpha: f32,
    pub draw_frame: u32,
    pub _pad: [u32; 2],
}

impl Default for ModelUniformData {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// An object's run of matrices: element 0 is the root transform, the rest
/// are piece transforms. Owned by exactly one object and never cloned.
#[derive(Debug, PartialEq, Eq)]
pub struct MatricesMemAlloc {
    first: usize,
    count: usize,
}

impl MatricesMemAlloc {
    pub fn first_elem(&self) -> usize {
        self.first
    }

    pub fn num_elems(&self) -> usize {
        self.count
    }
}

/// Matrix and uniform arenas shared by all objects of one drawer.
#[derive(Debug)]
pub struct ModelsMemStorage {
    matrices: SegmentedArena<Mat4>,
    uniforms: SegmentedArena<ModelUniformData>,
}

impl Default for ModelsMemStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelsMemStorage {
    pub fn new() -> Self {
        Self {
            matrices: SegmentedArena::new(Mat4::ZERO),
            uniforms: SegmentedArena::new(ModelUniformData::zeroed()),
        }
    }

    pub fn allocate_matrices(&mut self, count: usize) -> MatricesMemAlloc {
        let first = self.matrices.allocate(count);
        MatricesMemAlloc { first, count }
    }

    pub fn free_matrices(&mut self, alloc: MatricesMemAlloc) {
        self.matrices.free(alloc.first, alloc.count);
    }

    pub fn allocate_uniforms(&mut self) -> usize {
        self.uniforms.allocate(1)
    }

    pub fn free_uniforms(&mut self, index: usize) {
        self.uniforms.free(index, 1);
    }

    pub fn matrix(&self, index: usize) -> Option<&Mat4> {
        self.matrices.get(index)
    }

    /// Copy `src` into the run starting at the allocation's first element.
    pub fn write_matrices(&mut self, alloc: &MatricesMemAlloc, src: &[Mat4], frame: u64) {
        debug_assert!(src.len() <= alloc.count);
        for (i, m) in src.iter().take(alloc.count).enumerate() {
            if let Some(slot) = self.matrices.get_mut(alloc.first + i, frame) {
                *slot = *m;
            }
        }
    }

    pub fn uniforms(&self, index: usize) -> Option<&ModelUniformData> {
        self.uniforms.get(index)
    }

    pub fn uniforms_mut(&mut self, index: usize, frame: u64) -> Option<&mut ModelUniformData> {
        self.uniforms.get_mut(index, frame)
    }

    pub fn matrix_arena(&self) -> &SegmentedArena<Mat4> {
        &self.matrices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_offsets_survive_unrelated_churn() {
        let mut s = ModelsMemStorage::new();
        let keep = s.allocate_matrices(4);
        let marker = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        s.write_matrices(&keep, &[marker; 4], 0);
        let first = keep.first_elem();

        let mut others = Vec::new();
        for n in 1..40 {
            others.push(s.allocate_matrices(n * 37));
            if n % 3 == 0 {
                let a = others.swap_remove(0);
                s.free_matrices(a);
            }
        }
        for a in others {
            s.free_matrices(a);
        }

        assert_eq!(keep.first_elem(), first);
        for i in 0..4 {
            assert_eq!(s.matrix(first + i), Some(&marker));
        }
    }

    #[test]
    fn freed_runs_are_zeroed_and_reused() {
        let mut s = ModelsMemStorage::new();
        let a = s.allocate_matrices(3);
        let a_first = a.first_elem();
        s.write_matrices(&a, &[Mat4::IDENTITY; 3], 5);
        s.free_matrices(a);
        assert_eq!(s.matrix(a_first), Some(&Mat4::ZERO));

        let b = s.allocate_matrices(2);
        assert_eq!(b.first_elem(), a_first);
    }

    #[test]
    fn adjacent_free_runs_coalesce() {
        let mut arena = SegmentedArena::new(0u32);
        let a = arena.allocate(2);
        let b = arena.allocate(2);
        let c = arena.allocate(2);
        let _d = arena.allocate(1);
        arena.free(a, 2);
        arena.free(c, 2);
        arena.free(b, 2);
        assert_eq!(arena.free_slots(), 6);
        // One merged run now fits six.
        assert_eq!(arena.allocate(6), a);
    }

    #[test]
    fn growth_spans_pages_without_moving() {
        let mut arena = SegmentedArena::new(0u64);
        let first = arena.allocate(PAGE_SIZE - 1);
        let straddling = arena.allocate(10);
        assert_eq!(straddling, PAGE_SIZE - 1);
        *arena.get_mut(first, 0).unwrap() = 42;
        *arena.get_mut(straddling + 9, 0).unwrap() = 7;
        arena.allocate(PAGE_SIZE * 3);
        assert_eq!(arena.get(first), Some(&42));
        assert_eq!(arena.get(straddling + 9), Some(&7));
    }

    #[test]
    fn writes_stay_dirty_for_buffering_frames() {
        let mut arena = SegmentedArena::new(0u32);
        let a = arena.allocate(4);
        *arena.get_mut(a + 1, 10).unwrap() = 1;
        *arena.get_mut(a + 2, 10).unwrap() = 1;
        assert!(arena.is_dirty(a + 2, 10));
        assert!(arena.is_dirty(a + 1, 12));
        assert!(!arena.is_dirty(a + 1, 13));
        assert!(!arena.is_dirty(a, 10));
    }

    #[test]
    fn uniform_record_is_gpu_sized() {
        let mut s = ModelsMemStorage::new();
        let idx = s.allocate_uniforms();
        s.uniforms_mut(idx, 0).unwrap().team = 3;
        let record = s.uniforms(idx).unwrap();
        assert_eq!(bytemuck::bytes_of(record).len(), 32);
        assert_eq!(s.uniforms(idx).unwrap().team, 3);
    }

    #[test]
    fn allocations_do_not_overlap() {
        let mut s = ModelsMemStorage::new();
        let pad = s.allocate_matrices(5);
        let a = s.allocate_matrices(3);
        assert_eq!(a.first_elem(), pad.first_elem() + pad.num_elems());
        assert_eq!(a.num_elems(), 3);
    }
}
