pub mod label_converter;
pub mod string_utils;
