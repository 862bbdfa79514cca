//! 시세 데이터 도메인 모델.

mod bar;

pub use bar::*;
