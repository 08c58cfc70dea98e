mod codec;
mod erasure;
mod merkle_tree;
