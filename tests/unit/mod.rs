mod medium;
mod mobility;
