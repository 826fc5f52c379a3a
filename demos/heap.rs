use rheap::{HEADER_SIZE, Heap, HeapConfig};
use tracing_subscriber::EnvFilter;

/// Prints every block of the heap in address order.
fn print_blocks(
  label: &str,
  heap: &Heap<impl rheap::GrowthHook>,
) {
  println!("\n[{}] capacity = {} bytes", label, heap.capacity());
  for block in heap.blocks() {
    println!(
      "  {:>5} .. {:>5}  {:>4} bytes  {}",
      block.offset,
      block.payload_offset() + block.size,
      block.size,
      if block.used { "used" } else { "free" }
    );
  }
}

fn main() {
  // RUST_LOG=rheap=trace shows every split and merge.
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  println!("header size = {} bytes", HEADER_SIZE);

  let mut heap = HeapConfig::default().build().expect("default config is valid");
  print_blocks("start", &heap);

  // --------------------------------------------------------------------
  // 1) Two allocations, written through their payloads.
  // --------------------------------------------------------------------
  let first = heap.acquire(16).expect("fits in an empty heap");
  heap.payload_mut(first).expect("live").fill(0xAB);
  let second = heap.acquire(24).expect("fits after the first");
  heap.payload_mut(second).expect("live").fill(0x11);
  print_blocks("two allocations", &heap);

  // --------------------------------------------------------------------
  // 2) Free the first block and allocate something smaller. First-fit
  //    hands back the same address.
  // --------------------------------------------------------------------
  heap.release(first);
  let third = heap.acquire(8).expect("reuses the freed block");
  println!(
    "\n[reuse] third == first? {}",
    if third == first { "yes" } else { "no" }
  );

  // --------------------------------------------------------------------
  // 3) Release everything. The neighbours coalesce back into one block.
  // --------------------------------------------------------------------
  heap.release(second);
  heap.release(third);
  print_blocks("all released", &heap);

  // --------------------------------------------------------------------
  // 4) A fixed heap cannot satisfy more than it holds.
  // --------------------------------------------------------------------
  match heap.acquire(4096) {
    Ok(ptr) => println!("\n[exhaustion] unexpectedly got {:?}", ptr),
    Err(err) => println!("\n[exhaustion] {}", err),
  }

  // --------------------------------------------------------------------
  // 5) The same request with page growth enabled.
  // --------------------------------------------------------------------
  let config = HeapConfig {
    max_capacity: Some(64 * 1024),
    ..HeapConfig::default()
  };
  let mut growing = config.build().expect("growth config is valid");
  let big = growing.acquire(4096).expect("heap grows to fit");
  print_blocks("after growth", &growing);
  growing.release(big);
}
