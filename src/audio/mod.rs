pub mod capture;
pub mod energy;
pub mod frame;
pub mod replay;
