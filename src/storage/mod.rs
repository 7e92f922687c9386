//! Physical storage: chunk buffers, encoders, and the data manager

mod buffer;
mod chunk;
mod data_mgr;
mod encoder;

pub use buffer::{read_index_entry, write_index_entry, ChunkBuffer, INDEX_ENTRY_SIZE};
pub use chunk::{Chunk, ChunkKey};
pub use data_mgr::{ChunkImage, DataManager};
pub use encoder::{
    make_encoder, seeded_encoder, ChunkMeta, Encoder, FixedArrayEncoder, NoneEncoder,
    ScalarEncoder, StatValue,
};
