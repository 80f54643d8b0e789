use mail_dispatch::services::batcher::create_batches;

#[test]
fn test_batches_split_with_remainder() {
    let recipients: Vec<u32> = (1..=2500).collect();

    let batches = create_batches(&recipients, 1000);

    let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![1000, 1000, 500]);

    let rejoined: Vec<u32> = batches.into_iter().flatten().collect();
    assert_eq!(rejoined, recipients, "order must be preserved");
}

#[test]
fn test_exact_multiple_has_no_empty_tail() {
    let recipients: Vec<u32> = (0..6).collect();

    let batches = create_batches(&recipients, 3);

    assert_eq!(batches, vec![vec![0, 1, 2], vec![3, 4, 5]]);
}

#[test]
fn test_empty_input_yields_no_batches() {
    let batches = create_batches::<u32>(&[], 10);
    assert!(batches.is_empty());
}

#[test]
fn test_partition_is_deterministic() {
    let recipients: Vec<String> = (0..17).map(|i| format!("user{}@example.com", i)).collect();

    assert_eq!(create_batches(&recipients, 4), create_batches(&recipients, 4));
}

#[test]
fn test_zero_batch_size_is_treated_as_one() {
    let batches = create_batches(&[1, 2, 3], 0);
    assert_eq!(batches, vec![vec![1], vec![2], vec![3]]);
}
