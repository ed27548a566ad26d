//! # Architecture Abstraction Layer
//!
//! Hardware boundary of the kernel. The scheduler core never touches a
//! register or the stack pointer; everything instruction-specific lives in
//! the port module for the target CPU. Porting to another AVR means
//! adjusting the program counter width, the interrupt vectors and the
//! default tick source in a sibling module.

pub mod avr;
