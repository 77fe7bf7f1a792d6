pub mod pump;
pub mod tokenizer;
