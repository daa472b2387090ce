use thiserror::Error;

#[derive(Clone, Error, Debug, PartialEq)]
pub enum ObjectStorageError {
    #[error("Cannot get object file `{file_name:?}` error in `{bucket_name:?}`: {raw_error_message:?}.")]
    CannotGetObjectFile {
        bucket_name: String,
        file_name: String,
        raw_error_message: String,
    },
    #[error("Cannot upload file error for `{bucket_name:?}`: {raw_error_message:?}.")]
    CannotUploadFile {
        bucket_name: String,
        file_name: String,
        raw_error_message: String,
    },
}
