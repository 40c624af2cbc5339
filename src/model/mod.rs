pub mod ctc;
pub mod log;
pub mod recognizer;
pub mod seq_net;
