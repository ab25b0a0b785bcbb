use super::*;
use crate::tests::{run, CountingAllocator, FailingAllocator};



fn chain_of<A: Allocator>(cap: usize, alloc: A, vals: &[i32]) -> Chain<i32, A> {
  let mut chain = Chain::new_in(cap, alloc).unwrap();
  for v in vals {
    chain.push(*v).unwrap();
  }
  chain
}

fn segment_contents<A: Allocator>(chain: &Chain<i32, A>) -> Vec<Vec<i32>> {
  chain.segments().map(|s| s.as_slice().to_vec()).collect()
}

#[test]
fn new_chain_has_one_empty_segment() {
  run(|| {
    let alloc = CountingAllocator::new();
    let chain = Chain::<u32, _>::new_in(4, &alloc).unwrap();
    assert!(chain.is_initialized());
    assert!(chain.is_empty());
    assert_eq!(chain.len(), 0);
    assert_eq!(chain.segment_count(), 1);
    assert_eq!(chain.capacity_per_segment(), 4);
    assert_eq!(chain.lifetime(), Lifetime::Persistent);
    assert!(chain.hint().is_none());
    assert_eq!(alloc.allocs(), 2);
  });
}

#[test]
fn sequential_add_spills_into_second_segment() {
  run(|| {
    let chain = chain_of(4, Global, &[1, 2, 3, 4, 5, 6]);
    assert_eq!(chain.segment_count(), 2);
    assert_eq!(segment_contents(&chain), vec![vec![1, 2, 3, 4], vec![5, 6]]);

    let head = chain.head().unwrap();
    assert!(head.is_full());
    assert_eq!(head.next().unwrap().len(), 2);

    assert_eq!(chain.len(), 6);
    assert_eq!(chain.get(4), Ok(&5));
  });
}

#[test]
fn sequential_round_trip() {
  run(|| {
    let vals: Vec<i32> = (0..23).map(|i| i * 3 - 7).collect();
    let chain = chain_of(5, Global, &vals);
    assert_eq!(chain.segment_count(), 5);

    for (i, v) in vals.iter().enumerate() {
      assert_eq!(chain.get(i), Ok(v));
    }
    assert_eq!(chain.iter().copied().collect::<Vec<_>>(), vals);
    assert_eq!(chain.to_vec(), vals);
    assert_eq!(chain.iter().len(), vals.len());
  });
}

#[test]
fn extend_from_slice_fills_segments_in_order() {
  run(|| {
    let mut chain = Chain::<i32>::new(4).unwrap();
    chain.extend_from_slice(&[1, 2, 3]).unwrap();
    chain.extend_from_slice(&[4, 5, 6, 7, 8, 9, 10, 11, 12, 13]).unwrap();
    assert_eq!(
      segment_contents(&chain),
      vec![
        vec![1, 2, 3, 4],
        vec![5, 6, 7, 8],
        vec![9, 10, 11, 12],
        vec![13]
      ]
    );
    chain.extend_from_slice(&[]).unwrap();
    assert_eq!(chain.len(), 13);
  });
}

#[test]
fn full_segment_becomes_hint() {
  run(|| {
    let chain = chain_of(2, Global, &[1, 2, 3, 4, 5]);
    let segs: Vec<_> = chain.segments().collect();
    assert_eq!(segs.len(), 3);
    let hint = chain.hint().unwrap();
    assert!(core::ptr::eq(hint, segs[1]));
  });
}

#[test]
fn stale_hint_still_appends_at_tail() {
  run(|| {
    let mut chain = chain_of(2, Global, &[1, 2, 3, 4, 5, 6]);
    assert_eq!(chain.segment_count(), 3);

    // point the hint back at the head, two segments behind the tail.
    let head = chain.head().unwrap();
    chain.set_hint(head);

    chain.push(7).unwrap();
    chain.extend_from_slice(&[8, 9, 10]).unwrap();
    assert_eq!(
      segment_contents(&chain),
      vec![vec![1, 2], vec![3, 4], vec![5, 6], vec![7, 8], vec![9, 10]]
    );
  });
}

#[test]
fn hint_on_non_full_segment_is_harmless() {
  run(|| {
    let mut chain = chain_of(3, Global, &[1, 2, 3, 4]);
    let tail = chain.segments().last().unwrap();
    chain.set_hint(tail);

    chain.push(5).unwrap();
    assert_eq!(segment_contents(&chain), vec![vec![1, 2, 3], vec![4, 5]]);
  });
}

#[test]
fn get_out_of_bounds() {
  run(|| {
    let chain = chain_of(4, Global, &[1, 2, 3, 4, 5, 6]);
    assert_eq!(chain.get(6), Err(Error::OutOfBounds { index: 6, len: 6 }));
    assert_eq!(
      chain.get(usize::MAX),
      Err(Error::OutOfBounds {
        index: usize::MAX,
        len: 6
      })
    );
  });
}

#[test]
fn get_mut_and_iter_mut() {
  run(|| {
    let mut chain = chain_of(3, Global, &[1, 2, 3, 4, 5]);
    *chain.get_mut(3).unwrap() = 40;
    for v in chain.iter_mut() {
      *v *= 2;
    }
    assert_eq!(chain.to_vec(), vec![2, 4, 6, 80, 10]);

    for v in &mut chain {
      *v += 1;
    }
    let collected: Vec<i32> = (&chain).into_iter().copied().collect();
    assert_eq!(collected, vec![3, 5, 7, 81, 11]);
  });
}

#[test]
fn copy_to_stops_at_destination_or_end() {
  run(|| {
    let chain = chain_of(4, Global, &[1, 2, 3, 4, 5, 6]);

    let mut small = [0; 5];
    assert_eq!(chain.copy_to(&mut small), 5);
    assert_eq!(small, [1, 2, 3, 4, 5]);

    let mut large = [0; 8];
    assert_eq!(chain.copy_to(&mut large), 6);
    assert_eq!(large, [1, 2, 3, 4, 5, 6, 0, 0]);

    assert_eq!(chain.copy_to(&mut []), 0);
  });
}

#[test]
fn contains_and_remove() {
  run(|| {
    let mut chain = chain_of(4, Global, &[1, 2, 3, 4, 5, 6]);
    assert!(chain.contains(&5));
    assert!(!chain.contains(&9));

    assert!(chain.remove(&2));
    assert_eq!(segment_contents(&chain), vec![vec![1, 4, 3], vec![5, 6]]);
    assert!(chain.hint().is_none());

    assert!(chain.remove(&6));
    assert!(!chain.remove(&6));
    assert_eq!(chain.len(), 4);
    assert!(!chain.contains(&6));
  });
}

#[test]
fn removed_slots_are_refilled() {
  run(|| {
    let mut chain = chain_of(4, Global, &[1, 2, 3, 4, 5]);
    assert!(chain.remove(&1));
    chain.push(6).unwrap();
    assert_eq!(segment_contents(&chain), vec![vec![4, 2, 3, 6], vec![5]]);
  });
}

#[test]
fn swap_remove_by_flat_index() {
  run(|| {
    let mut chain = chain_of(4, Global, &[1, 2, 3, 4, 5, 6]);
    assert_eq!(chain.swap_remove(1), Ok(2));
    assert_eq!(segment_contents(&chain), vec![vec![1, 4, 3], vec![5, 6]]);
    assert_eq!(chain.swap_remove(3), Ok(5));
    assert_eq!(segment_contents(&chain), vec![vec![1, 4, 3], vec![6]]);
    assert_eq!(
      chain.swap_remove(4),
      Err(Error::OutOfBounds { index: 4, len: 4 })
    );
  });
}

#[test]
fn clear_keeps_segments_for_reuse() {
  run(|| {
    let alloc = CountingAllocator::new();
    let mut chain = chain_of(2, &alloc, &[1, 2, 3, 4, 5]);
    assert_eq!(chain.segment_count(), 3);
    let allocs = alloc.allocs();

    chain.clear();
    assert!(chain.is_empty());
    assert_eq!(chain.segment_count(), 3);
    assert!(chain.hint().is_none());
    assert_eq!(chain.get(0), Err(Error::OutOfBounds { index: 0, len: 0 }));

    chain.extend_from_slice(&[7, 8, 9, 10, 11, 12]).unwrap();
    assert_eq!(alloc.allocs(), allocs);
    assert_eq!(
      segment_contents(&chain),
      vec![vec![7, 8], vec![9, 10], vec![11, 12]]
    );
  });
}

#[test]
fn dispose_unpopulated_chain() {
  run(|| {
    let alloc = CountingAllocator::new();
    let mut chain = Chain::<u64, _>::new_in(16, &alloc).unwrap();
    chain.dispose();
    alloc.assert_balanced();
    assert!(!chain.is_initialized());
    chain.dispose();
    drop(chain);
    alloc.assert_balanced();
  });
}

#[test]
fn dispose_releases_every_segment() {
  run(|| {
    let alloc = CountingAllocator::new();
    {
      let chain = chain_of(3, &alloc, &(0..20).collect::<Vec<_>>());
      assert_eq!(chain.segment_count(), 7);
      assert_eq!(alloc.allocs(), 14);
      assert!(alloc.live_bytes() > 0);
    }
    assert_eq!(alloc.frees(), 14);
    alloc.assert_balanced();
  });
}

#[test]
fn disposed_chain_is_uninitialized() {
  run(|| {
    let mut chain = chain_of(4, Global, &[1, 2, 3]);
    chain.dispose();

    assert_eq!(chain.get(0), Err(Error::Uninitialized));
    assert_eq!(chain.get_mut(0), Err(Error::Uninitialized));
    assert_eq!(chain.swap_remove(0), Err(Error::Uninitialized));
    assert_eq!(chain.push(4), Err(Error::Uninitialized));
    assert_eq!(chain.extend_from_slice(&[5]), Err(Error::Uninitialized));
    assert_eq!(chain.len(), 0);
    assert_eq!(chain.segment_count(), 0);
    assert!(chain.iter().next().is_none());
    assert!(!chain.contains(&1));
    assert!(!chain.remove(&1));
    chain.clear();
  });
}

#[test]
fn default_chain_is_uninitialized() {
  run(|| {
    let mut chain = Chain::<u16>::default();
    assert!(!chain.is_initialized());
    assert_eq!(chain.capacity_per_segment(), ChainOptions::new().capacity());
    assert_eq!(chain.get(0), Err(Error::Uninitialized));
    assert_eq!(chain.writer().add_concurrent(1), Err(Error::Uninitialized));
  });
}

#[test]
fn options_build() {
  run(|| {
    let alloc = CountingAllocator::with_lifetime(Lifetime::Custom(7));
    let opts = ChainOptions::new()
      .with_capacity(3)
      .with_lifetime(Lifetime::Custom(7));
    {
      let mut chain = opts.build_in::<u8, _>(&alloc).unwrap();
      chain.extend_from_slice(&[1, 2, 3, 4]).unwrap();
      assert_eq!(chain.lifetime(), Lifetime::Custom(7));
      assert_eq!(chain.segment_count(), 2);
    }
    alloc.assert_balanced();

    let chain = ChainOptions::default().build::<f32>().unwrap();
    assert_eq!(chain.capacity_per_segment(), 64);
  });
}

#[test]
fn zero_capacity_is_rejected() {
  run(|| {
    let alloc = CountingAllocator::new();
    assert_eq!(Chain::<u32>::new(0).unwrap_err(), Error::ZeroCapacity);
    assert_eq!(
      Chain::<u32, _>::new_in(0, &alloc).unwrap_err(),
      Error::ZeroCapacity
    );
    assert_eq!(alloc.allocs(), 0);
  });
}

#[test]
#[should_panic(expected = "segment capacity must be greater than zero")]
fn zero_capacity_options_panic() {
  let _ = ChainOptions::new().with_capacity(0);
}

#[test]
fn creation_fails_when_allocator_is_exhausted() {
  run(|| {
    let alloc = FailingAllocator::new(0);
    let err = Chain::<u32, _>::new_in(4, &alloc).unwrap_err();
    assert_eq!(
      err,
      Error::AllocationFailed {
        size: 16,
        align: 4,
      }
    );

    // payload allocated, header fails: the payload must be released.
    let alloc = FailingAllocator::new(1);
    assert!(Chain::<u32, _>::new_in(4, &alloc).is_err());
    alloc.counter().assert_balanced();
  });
}

#[test]
fn extension_failure_is_surfaced() {
  run(|| {
    let alloc = FailingAllocator::new(2);
    {
      let mut chain = Chain::<u32, _>::new_in(2, &alloc).unwrap();
      chain.push(1).unwrap();
      chain.push(2).unwrap();
      assert!(matches!(
        chain.push(3),
        Err(Error::AllocationFailed { .. })
      ));
      assert_eq!(chain.to_vec(), vec![1, 2]);

      // the run placed before the failure stays in the chain.
      chain.clear();
      chain.push(9).unwrap();
      assert!(chain.extend_from_slice(&[10, 11]).is_err());
      assert_eq!(chain.to_vec(), vec![9, 10]);
      assert_eq!(chain.segment_count(), 1);
    }
    alloc.counter().assert_balanced();
  });
}

#[test]
fn debug_output() {
  run(|| {
    let chain = chain_of(2, Global, &[1, 2, 3]);
    assert_eq!(std::format!("{:?}", chain), "[1, 2, 3]");
    let seg = std::format!("{:?}", chain.head().unwrap());
    assert!(seg.contains("Segment"));
    assert!(seg.contains("[1, 2]"));
  });
}

#[test]
fn array_elements() {
  run(|| {
    let mut chain = Chain::<[u8; 3]>::new(2).unwrap();
    chain
      .extend_from_slice(&[[1, 2, 3], [4, 5, 6], [7, 8, 9]])
      .unwrap();
    assert_eq!(chain.get(2), Ok(&[7, 8, 9]));
    assert_eq!(chain.segment_count(), 2);
  });
}

#[test]
fn swapping_segment_handles_keeps_ownership() {
  run(|| {
    let small = CountingAllocator::new();
    let large = CountingAllocator::new();
    {
      let mut a = Chain::<u32, _>::new_in(4, &small).unwrap();
      let mut b = Chain::<u32, _>::new_in(1024, &large).unwrap();
      a.extend_from_slice(&[1, 2]).unwrap();
      b.extend_from_slice(&[3, 4, 5]).unwrap();

      let mut x = a.segments_mut().next().unwrap();
      let mut y = b.segments_mut().next().unwrap();
      core::mem::swap(&mut x, &mut y);
      assert_eq!(x.capacity(), 1024);
      x.as_mut_slice()[0] = 30;
      y.clear();

      assert_eq!(a.to_vec(), Vec::<u32>::new());
      assert_eq!(b.to_vec(), vec![30, 4, 5]);
    }
    small.assert_balanced();
    large.assert_balanced();
  });
}

#[test]
fn segment_handle_mutations_reset_hint() {
  run(|| {
    let mut chain = chain_of(2, Global, &[1, 2, 3, 4, 5]);
    let head = chain.head().unwrap();
    chain.set_hint(head);

    let mut seg = chain.segments_mut().nth(1).unwrap();
    assert_eq!(seg.get_mut(1).map(|v| *v), Some(4));
    assert_eq!(seg.remove_swap_back(0), Ok(3));
    assert!(chain.hint().is_none());

    let head = chain.head().unwrap();
    chain.set_hint(head);
    assert!(!chain.segments_mut().any(|mut seg| seg.remove(&9)));
    assert!(chain.hint().is_some());

    chain.segments_mut().next().unwrap().clear();
    assert!(chain.hint().is_none());

    chain.extend_from_slice(&[6, 7, 8]).unwrap();
    assert_eq!(segment_contents(&chain), vec![vec![6, 7], vec![4, 8], vec![5]]);
  });
}

#[test]
fn hint_never_moves_backwards() {
  run(|| {
    let chain = chain_of(1, Global, &[1, 2, 3]);
    let segs: Vec<&Segment<i32>> = chain.segments().collect();
    let as_ptr = |seg: &Segment<i32>| seg as *const Segment<i32> as *mut Segment<i32>;

    chain.set_hint(segs[0]);
    let mut observed = as_ptr(segs[0]);
    chain.mark_full(&mut observed, segs[1]);
    assert!(core::ptr::eq(chain.hint().unwrap(), segs[1]));
    assert_eq!(observed, as_ptr(segs[1]));

    // a writer which read the hint before it moved cannot pull it back.
    let mut stale = core::ptr::null_mut();
    chain.mark_full(&mut stale, segs[0]);
    assert!(core::ptr::eq(chain.hint().unwrap(), segs[1]));
    assert!(stale.is_null());
  });
}

#[test]
fn iter_len_counts_down() {
  run(|| {
    let chain = chain_of(2, Global, &[1, 2, 3, 4, 5]);
    let mut iter = chain.iter();
    assert_eq!(iter.len(), 5);
    iter.next();
    iter.next();
    iter.next();
    assert_eq!(iter.len(), 2);
    assert_eq!(iter.clone().copied().collect::<Vec<_>>(), vec![4, 5]);
    iter.by_ref().for_each(drop);
    assert_eq!(iter.len(), 0);
    assert_eq!(iter.next(), None);
  });
}
