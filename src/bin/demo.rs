//! Interactive walkthrough of the three queue variants.
//!
//! Run: cargo run --bin demo
//!
//! Sends ten messages through each variant with one producer and one
//! consumer thread, printing both sides' progress. Shows the spin/yield
//! retry discipline for the non-blocking variants, the condvar-backed
//! blocking pop for the locked baseline, and the drain handshake the
//! double-buffer swap contract requires.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use triq::double_buffer;
use triq::locked::LockedQueue;
use triq::ring;

const MESSAGES: u64 = 10;

#[derive(Debug)]
struct Message {
    id: u64,
    content: String,
}

impl Message {
    fn new(id: u64, source: &str) -> Self {
        Self {
            id,
            content: format!("hello from {source} {id}"),
        }
    }
}

// The double-buffer read path takes elements out by value.
impl Default for Message {
    fn default() -> Self {
        Self {
            id: 0,
            content: String::new(),
        }
    }
}

fn demo_ring() {
    println!("\n=== lock-free ring buffer ===");

    let (mut tx, mut rx) = ring::ring_buffer::<Message>(16);
    let done = Arc::new(AtomicBool::new(false));
    let done_clone = Arc::clone(&done);

    let producer = thread::spawn(move || {
        for i in 0..MESSAGES {
            let mut msg = Message::new(i, "ring producer");
            loop {
                match tx.push(msg) {
                    Ok(()) => break,
                    Err(full) => {
                        msg = full.into_inner();
                        thread::yield_now();
                    }
                }
            }
            println!("producer: sent {i}");
            thread::sleep(Duration::from_millis(20));
        }
        done_clone.store(true, Ordering::Release);
    });

    let consumer = thread::spawn(move || {
        let mut received = 0u64;
        loop {
            if let Some(msg) = rx.pop() {
                println!("consumer: got {} - {}", msg.id, msg.content);
                received += 1;
            } else if done.load(Ordering::Acquire) && rx.is_empty() {
                break;
            } else {
                thread::yield_now();
            }
        }
        received
    });

    producer.join().unwrap();
    let received = consumer.join().unwrap();
    println!("consumer received {received} messages");
}

fn demo_locked() {
    println!("\n=== locked queue (blocking pop) ===");

    let queue = Arc::new(LockedQueue::<Message>::new(16));
    let producer_queue = Arc::clone(&queue);

    let producer = thread::spawn(move || {
        for i in 0..MESSAGES {
            let mut msg = Message::new(i, "locked producer");
            loop {
                match producer_queue.push(msg) {
                    Ok(()) => break,
                    Err(full) => {
                        msg = full.into_inner();
                        thread::yield_now();
                    }
                }
            }
            println!("producer: sent {i}");
            thread::sleep(Duration::from_millis(20));
        }
    });

    let consumer = thread::spawn(move || {
        // The blocking pop parks on the condvar instead of spinning, so the
        // consumer knows exactly how many messages to expect.
        for _ in 0..MESSAGES {
            let msg = queue.pop_blocking();
            println!("consumer: got {} - {}", msg.id, msg.content);
        }
        MESSAGES
    });

    producer.join().unwrap();
    let received = consumer.join().unwrap();
    println!("consumer received {received} messages");
}

fn demo_double_buffer() {
    println!("\n=== double buffer (batch of 3) ===");

    let (mut tx, mut rx) = double_buffer::queue::<Message>(16);
    let done = Arc::new(AtomicBool::new(false));
    let done_clone = Arc::clone(&done);

    let producer = thread::spawn(move || {
        for i in 0..MESSAGES {
            tx.push(Message::new(i, "double buffer producer")).unwrap();
            println!("producer: sent {i}");

            // Publish every third message. The swap contract requires the
            // previous epoch to be drained first.
            if i % 3 == 2 {
                while !tx.swap_ready() {
                    thread::yield_now();
                }
                unsafe { tx.swap_buffers() };
                println!("producer: swapped buffers");
            }

            thread::sleep(Duration::from_millis(20));
        }

        // Final swap so the tail of the sequence can be consumed.
        while !tx.swap_ready() {
            thread::yield_now();
        }
        unsafe { tx.swap_buffers() };
        while !tx.swap_ready() {
            thread::yield_now();
        }
        done_clone.store(true, Ordering::Release);
    });

    let consumer = thread::spawn(move || {
        let mut received = 0u64;
        loop {
            if let Some(msg) = rx.pop() {
                println!("consumer: got {} - {}", msg.id, msg.content);
                received += 1;
            } else if done.load(Ordering::Acquire) && !rx.has_data() {
                break;
            } else {
                thread::yield_now();
            }
        }
        received
    });

    producer.join().unwrap();
    let received = consumer.join().unwrap();
    println!("consumer received {received} messages");
}

fn main() {
    println!("SPSC queue variants demo");
    println!("========================");

    demo_ring();
    thread::sleep(Duration::from_millis(200));

    demo_locked();
    thread::sleep(Duration::from_millis(200));

    demo_double_buffer();

    println!("\ndone");
}
