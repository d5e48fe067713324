use cfdbg::kmer::cuckoo::{CuckooFilter, MAX_COUNT};
use cfdbg::kmer::kmer::Kmer;
use cfdbg::pipeline::count::insert_read;
use tempfile::TempDir;

const K: usize = 7;

fn kmers_of(read: &str) -> Vec<Kmer> {
    read.as_bytes()
        .windows(K)
        .map(|w| Kmer::from_ascii(w).unwrap().canonical().0)
        .collect()
}

#[test]
fn test_both_strands_share_one_counter() {
    let filter = CuckooFilter::new(4096, K);
    let read = "ACGGTCAGGATTCCAGT";
    let rc: String = read
        .chars()
        .rev()
        .map(|c| match c {
            'A' => 'T',
            'C' => 'G',
            'G' => 'C',
            _ => 'A',
        })
        .collect();

    insert_read(&filter, read.as_bytes()).unwrap();
    let (_, fresh) = insert_read(&filter, rc.as_bytes()).unwrap();
    assert!(fresh.is_empty(), "reverse strand k-mers were already counted");
    for kmer in kmers_of(read) {
        assert_eq!(filter.get_count(&kmer), 2);
    }
}

#[test]
fn test_counts_saturate_at_max() {
    let filter = CuckooFilter::new(4096, K);
    for _ in 0..10 {
        insert_read(&filter, b"TTGACCAGTAG").unwrap();
    }
    for kmer in kmers_of("TTGACCAGTAG") {
        assert_eq!(filter.get_count(&kmer), MAX_COUNT);
    }
}

#[test]
fn test_saved_filter_answers_like_the_original() {
    let dir = TempDir::new().unwrap();
    let info = dir.path().join("reads.cf.Info");
    let hash = dir.path().join("reads.cf.Hash.gz");

    let reads = ["GATTACAGATTACCAGT", "CCCTTAGGGATCCATGA", "TTAGGCATCAGGATTAC"];
    let filter = CuckooFilter::new(4096, K);
    for read in reads {
        insert_read(&filter, read.as_bytes()).unwrap();
    }
    insert_read(&filter, reads[0].as_bytes()).unwrap();
    filter.save(&info, &hash).unwrap();

    let loaded = CuckooFilter::load(&info, &hash, Some(K)).unwrap();
    assert_eq!(loaded.items(), filter.items());
    assert_eq!(loaded.num_buckets(), filter.num_buckets());
    for read in reads {
        for kmer in kmers_of(read) {
            assert_eq!(loaded.get_count(&kmer), filter.get_count(&kmer));
        }
    }
    assert!(CuckooFilter::load(&info, &hash, Some(K + 2)).is_err());
}
