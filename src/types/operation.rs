/// Transaction prepared by the external SDK, waiting to be signed by the
/// bound identity and submitted through the active session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationRequest {
    transaction: Vec<u8>,
    skip_preflight: bool,
}

impl OperationRequest {
    pub fn new(transaction: Vec<u8>, skip_preflight: bool) -> Self {
        Self {
            transaction,
            skip_preflight,
        }
    }

    pub fn transaction(&self) -> &[u8] {
        &self.transaction
    }

    pub fn skip_preflight(&self) -> bool {
        self.skip_preflight
    }

    pub(crate) fn signed(self, transaction: Vec<u8>) -> SignedOperation {
        SignedOperation {
            transaction,
            skip_preflight: self.skip_preflight,
        }
    }
}

/// Signed transaction, ready to be sent as is.
///
/// Sending the same signed bytes more than once is safe: the cluster
/// deduplicates by signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedOperation {
    transaction: Vec<u8>,
    skip_preflight: bool,
}

impl SignedOperation {
    pub fn transaction(&self) -> &[u8] {
        &self.transaction
    }

    pub fn skip_preflight(&self) -> bool {
        self.skip_preflight
    }
}
