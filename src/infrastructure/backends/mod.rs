pub mod lumis;
