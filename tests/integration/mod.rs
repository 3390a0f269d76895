mod end_to_end;
mod error_handling;
mod storage;
