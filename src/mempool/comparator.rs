use super::PendingTransactionInfo;
use std::cmp::Ordering;

/// Mining priority, `Less` means `a` is mined first. Higher fee per byte wins, then the
/// smaller transaction, then the one received earlier.
pub fn priority_order(a: &PendingTransactionInfo, b: &PendingTransactionInfo) -> Ordering {
    let a_size = a.transaction.blob_size();
    let b_size = b.transaction.blob_size();

    // fee_a / size_a > fee_b / size_b without dividing
    let a_price = a.transaction.fee() as u128 * b_size as u128;
    let b_price = b.transaction.fee() as u128 * a_size as u128;

    b_price
        .cmp(&a_price)
        .then_with(|| a_size.cmp(&b_size))
        .then_with(|| a.receive_time.cmp(&b.receive_time))
}
